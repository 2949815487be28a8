//! Shared harness for the end-to-end tests: a broker on a temp socket
//! backed by the loopback driver.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tether_gateway::loopback::{GuildFixture, LoopbackFactory, LoopbackWorld};
use tether_router::{Router, RouterConfig};
use tether_transport::UnixSocketServer;

pub struct Harness {
    pub factory: Arc<LoopbackFactory>,
    pub router: Arc<Router>,
    pub socket: PathBuf,
    _dir: tempfile::TempDir,
}

/// Start a broker over a fresh temp socket.
pub async fn start(factory: LoopbackFactory) -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket = dir.path().join("broker.sock");

    let factory = Arc::new(factory);
    let router = Arc::new(Router::new(RouterConfig::default(), factory.clone()));
    let server = UnixSocketServer::bind(&socket).expect("bind socket");

    let serving = router.clone();
    tokio::spawn(async move {
        let _ = serving.serve_on(server).await;
    });

    Harness {
        factory,
        router,
        socket,
        _dir: dir,
    }
}

/// The fixture world most tests run against.
pub fn default_world() -> LoopbackWorld {
    LoopbackWorld::new("bot-user").with_guild(
        GuildFixture::new("g1", "Guild One")
            .with_channel("c1", "general")
            .with_channel("c2", "ops")
            .with_role("r1", "mods")
            .with_member("u1", &["r1"]),
    )
}

/// Poll until `probe` succeeds or two seconds pass.
pub async fn wait_until<T>(mut probe: impl FnMut() -> Option<T>) -> T {
    for _ in 0..200 {
        if let Some(value) = probe() {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within deadline");
}
