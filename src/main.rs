use std::{
    io::Write,
    panic,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc::{UnboundedSender, unbounded_channel},
};
use tokio_stream::{StreamExt, wrappers::LinesStream};
use tracing_subscriber::EnvFilter;

use snippet_runner::{
    bridge::{HostBridge, HostValue},
    config::Config,
    core::{pipeline::session::ExecutionSession, sink::LiveOutput},
    script::engine::ScriptEngine,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let config = Config::parse();
    tracing::debug!("Config: {:?}", config);

    let console = Arc::new(Console::default());
    let session = ExecutionSession::new(Arc::new(ScriptEngine::new()));
    let mut bridge = HostBridge::new(session);
    if !config.sync {
        bridge = bridge.with_stream_output(stdout_stream(console.clone()));
    }
    tracing::info!("Snippet runner initialized");

    let (result_tx, mut result_rx) = unbounded_channel::<serde_json::Value>();
    let printer = tokio::spawn(async move {
        while let Some(result) = result_rx.recv().await {
            println!("{}", console.result_line(&result));
        }
    });

    if let Some(path) = &config.file {
        let source = tokio::fs::read_to_string(path).await?;
        submit(&bridge, config.sync, source, &result_tx).await;
    } else {
        let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
        while let Some(line) = lines.next().await {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            submit(&bridge, config.sync, line, &result_tx).await;
        }
    }

    // Superseded runs drop their callbacks once they finish, which closes
    // the channel after the latest outcome is printed.
    drop(result_tx);
    printer.await?;

    Ok(())
}

async fn submit(
    bridge: &HostBridge,
    sync: bool,
    source: String,
    result_tx: &UnboundedSender<serde_json::Value>,
) {
    if sync {
        let result = bridge.run(vec![HostValue::string(source)]).await;
        forward_result(result_tx, result);
        return;
    }

    let result_tx = result_tx.clone();
    let on_complete = HostValue::function(move |result| forward_result(&result_tx, result));
    let ack = bridge.run(vec![HostValue::string(source), on_complete]).await;
    tracing::debug!("Submitted: {}", ack);
}

fn forward_result(result_tx: &UnboundedSender<serde_json::Value>, result: serde_json::Value) {
    if result_tx.send(result).is_err() {
        tracing::warn!("Result printer is gone");
    }
}

/// Tracks whether streamed output left the cursor mid-line, so result
/// objects always start on a line of their own.
#[derive(Debug, Default)]
struct Console {
    line_open: AtomicBool,
}

impl Console {
    fn streamed(&self, chunk: &str) {
        if let Some(last) = chunk.chars().last() {
            self.line_open.store(last != '\n', Ordering::SeqCst);
        }
    }

    fn result_line(&self, result: &serde_json::Value) -> String {
        if self.line_open.swap(false, Ordering::SeqCst) {
            format!("\n{result}")
        } else {
            result.to_string()
        }
    }
}

fn stdout_stream(console: Arc<Console>) -> LiveOutput {
    Arc::new(move |chunk: &str| {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(chunk.as_bytes()).and_then(|_| stdout.flush()) {
            tracing::warn!("Failed to stream output: {}", e);
        }
        console.streamed(chunk);
    })
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
