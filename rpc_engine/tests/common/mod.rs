#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::bail;
use rpc_engine::{RpcServer, ServiceBuilder, Transport};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

#[derive(Default)]
pub struct Calc {
    pub invocations: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Operands {
    #[serde(rename = "A")]
    pub a: i64,
    #[serde(rename = "B")]
    pub b: i64,
}

impl Calc {
    fn add(&self, params: Operands, result: &mut i64) -> anyhow::Result<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        *result = params.a + params.b;
        Ok(())
    }

    fn div(&self, params: Operands, result: &mut i64) -> anyhow::Result<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if params.b == 0 {
            bail!("divide by zero");
        }
        *result = params.a / params.b;
        Ok(())
    }
}

pub fn calc_service(calc: Arc<Calc>) -> ServiceBuilder<Calc> {
    ServiceBuilder::from_arc(calc)
        .method("add", Calc::add)
        .method("div", Calc::div)
}

pub fn ops(a: i64, b: i64) -> Operands {
    Operands { a, b }
}

/// Serves `server` on an ephemeral port until the sender is used or dropped.
pub fn spawn_server(server: RpcServer) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let shutdown = async {
            let _ = rx.await;
        };
        if let Err(err) = server.start_on_listener(listener, shutdown).await {
            panic!("server terminated unexpectedly: {err}");
        }
    });

    (addr, tx)
}

pub fn calc_server(transport: Transport) -> (RpcServer, Arc<Calc>) {
    let placeholder: SocketAddr = "127.0.0.1:0".parse().expect("socket addr");
    let server = RpcServer::new(transport, placeholder);
    let calc = Arc::new(Calc::default());
    server
        .register(calc_service(Arc::clone(&calc)))
        .expect("register Calc");
    (server, calc)
}
