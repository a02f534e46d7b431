use anyhow::{Context, Result};
use env_logger::Env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use voice_recorder::audio_input::CpalBackend;
use voice_recorder::config::Config;
use voice_recorder::focus::FocusArbiter;
use voice_recorder::recorder::Recorder;
use voice_recorder::types::{RecordingEvent, SessionState};

#[tokio::main]
async fn main() -> Result<()> {
    // コマンドライン引数をパース
    let args: Vec<String> = std::env::args().collect();

    // 設定ファイル生成モード
    if args.len() > 1 && args[1] == "--generate-config" {
        let config_path = if args.len() > 2 {
            &args[2]
        } else {
            "config.toml"
        };
        Config::write_default(config_path)?;
        println!("設定ファイルを生成しました: {}", config_path);
        return Ok(());
    }

    let mut config_path = "config.toml".to_string();
    let mut output_path: Option<PathBuf> = None;
    let mut show_interfaces = false;

    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--show-interfaces" => show_interfaces = true,
            "--output" => {
                let path = rest.next().context("--output にはパスが必要です")?;
                output_path = Some(PathBuf::from(path));
            }
            other if !other.starts_with("--") => config_path = other.to_string(),
            other => anyhow::bail!("不明なオプション: {}", other),
        }
    }

    // 設定を読み込み
    let config_exists = Path::new(&config_path).exists();
    let config = if config_exists {
        Config::from_file(&config_path)?
    } else {
        Config::default()
    };

    // ロガーを初期化
    env_logger::Builder::from_env(
        Env::default().default_filter_or(config.output.log_level.as_str()),
    )
    .format_timestamp(None)
    .init();

    if !config_exists {
        log::warn!(
            "設定ファイルが見つかりません。デフォルト設定を使用します: {:?}",
            config_path
        );
    }

    let backend = CpalBackend::new(&config.audio)?;

    // デバイス一覧表示モード
    if show_interfaces {
        backend.list_devices()?;
        return Ok(());
    }

    let output_path = output_path.unwrap_or_else(|| {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        PathBuf::from(&config.output.output_dir).join(format!("recording_{}.wav", timestamp))
    });

    log::info!("voice-recorder を起動します");
    log::debug!("設定: {:?}", config);

    let recorder = Arc::new(Recorder::new(
        Arc::new(backend),
        Arc::new(FocusArbiter::new()),
    ));

    let (tx, mut rx) = mpsc::channel::<RecordingEvent>(config.events.queue_capacity.max(1));
    recorder.attach_sink(Arc::new(tx));

    match recorder.start_recording(&output_path) {
        Ok(response) => println!("{}", serde_json::to_string(&response)?),
        Err(e) => {
            log::error!("録音を開始できません: {}", e);
            let response = serde_json::json!({
                "success": false,
                "error": e.code(),
                "message": e.to_string(),
            });
            println!("{}", response);
            std::process::exit(1);
        }
    }

    // Ctrl+C ハンドラを設定
    let recorder_clone = recorder.clone();
    ctrlc::set_handler(move || {
        log::info!("停止シグナルを受信しました...");
        if let Err(e) = recorder_clone.stop_recording() {
            log::debug!("停止要求を無視: {}", e);
        }
    })?;

    log::info!("録音中です (Ctrl+C で停止、最大60秒)");

    // メインループ: 完了イベントを待つ
    let mut success = false;
    'events: loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                println!("{}", serde_json::to_string(&event)?);
                if let RecordingEvent::RecordingComplete(report) = &event {
                    success = report.success;
                    break;
                }
            }
            _ = tokio::time::sleep(tokio::time::Duration::from_millis(200)) => {
                // 完了イベントが捨てられた場合に備えて状態を確認
                if recorder.state() == SessionState::Closed {
                    while let Ok(event) = rx.try_recv() {
                        println!("{}", serde_json::to_string(&event)?);
                        if let RecordingEvent::RecordingComplete(report) = &event {
                            success = report.success;
                        }
                    }
                    break 'events;
                }
            }
        }
    }

    // クリーンアップ
    recorder.detach_sink();
    recorder.dispose();

    log::info!("voice-recorder を終了しました");

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
