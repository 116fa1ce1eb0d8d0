use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::info;

use ledgerkv_common::FSYNC_INTERVAL_MS;
use ledgerkv_server::{Config, Dispatcher, Server, shutdown_signal};
use ledgerkv_storage::{Aof, Db, FsyncPolicy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerkv_server=info,ledgerkv_storage=info".into()),
        )
        .init();

    let config = Config::parse();

    // Sem AOF não há como servir: qualquer falha aqui encerra o processo.
    let aof_path = config.aof_path();
    let aof = Aof::open(&aof_path, config.fsync)
        .await
        .with_context(|| format!("falha ao abrir o AOF {}", aof_path.display()))?;

    let dispatcher = Dispatcher::new(Db::new(), aof.clone());
    let count = dispatcher
        .restore()
        .await
        .context("falha ao restaurar o AOF")?;
    if count > 0 {
        info!("{count} comandos restaurados do AOF");
    }

    let (fsync_tx, fsync_rx) = broadcast::channel::<()>(1);
    let fsync_task = (aof.policy() == FsyncPolicy::EverySec)
        .then(|| aof.spawn_fsync_task(Duration::from_millis(FSYNC_INTERVAL_MS), fsync_rx));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("LedgerKV escutando em {addr}");

    let server = Server::new(listener, dispatcher, config.max_connections);
    let result = server
        .run(shutdown_signal(signal::ctrl_c()))
        .await;

    let _ = fsync_tx.send(());
    if let Some(task) = fsync_task {
        task.await?;
    }
    aof.sync().await?;
    info!("LedgerKV encerrado");

    result.context("falha de persistência, encerrando")?;
    Ok(())
}
