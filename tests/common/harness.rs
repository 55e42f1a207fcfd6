use std::net::SocketAddr;

use clap::Parser;
use tokio::sync::{broadcast, oneshot, Mutex, MutexGuard, OnceCell};
use trivia_realtime_core::{start_server, Options};

static SERVER_LOCK: OnceCell<Mutex<()>> = OnceCell::const_new();

async fn server_lock() -> &'static Mutex<()> {
    SERVER_LOCK.get_or_init(|| async { Mutex::new(()) }).await
}

fn test_options(port: u16) -> Options {
    let args: Vec<&str> = vec![
        "trivia-realtime-core",
        "--server",
        Box::leak(format!("http://127.0.0.1:{port}/").into_boxed_str()),
        "--database-url",
        "sqlite::memory:",
    ];
    Options::parse_from(args)
}

pub struct Harness {
    pub base_url: String,
    shutdown_sender: broadcast::Sender<()>,
    app_handle: Option<tokio::task::JoinHandle<()>>,
    // Held for the harness's lifetime so concurrent tests don't race for the
    // same fixed port; released on drop.
    #[allow(dead_code)]
    lock: MutexGuard<'static, ()>,
}

impl Harness {
    pub async fn run() -> Self {
        let lock = server_lock().await.lock().await;
        // Port 0 would be ideal, but `start_server` binds eagerly from the
        // parsed `Options::server` url, so a fixed high port is used instead
        // and the server lock serializes tests onto it one at a time.
        let port = 19732;
        let options = test_options(port);
        let base_url = options.server.to_string();

        let (shutdown_sender, _) = broadcast::channel::<()>(1);
        let mut shutdown_receiver = shutdown_sender.subscribe();
        let (start_sender, start_receiver) = oneshot::channel::<()>();

        let app_handle = tokio::spawn(async move {
            let server = start_server(options).await.unwrap();
            start_sender.send(()).unwrap();
            server
                .with_graceful_shutdown(async move { shutdown_receiver.recv().await.unwrap() })
                .await
                .unwrap();
        });
        start_receiver.await.unwrap();

        Self {
            base_url,
            shutdown_sender,
            app_handle: Some(app_handle),
            lock,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn stop(mut self) {
        let _ = self.shutdown_sender.send(());
        if let Some(handle) = self.app_handle.take() {
            let _ = handle.await;
        }
    }
}

#[allow(dead_code)]
pub fn local_addr(base_url: &str) -> SocketAddr {
    let url = url::Url::parse(base_url).unwrap();
    format!("{}:{}", url.host_str().unwrap(), url.port().unwrap())
        .parse()
        .unwrap()
}
