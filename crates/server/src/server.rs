use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use ledgerkv_common::{ConnectionError, PersistenceError};

use crate::{Connection, Dispatcher, handle_connection};

type ConnectionResult = Result<Result<(), ConnectionError>, JoinError>;

/// Servidor TCP: aceita conexões e supervisiona uma task por cliente.
pub struct Server {
    listener: TcpListener,
    dispatcher: Dispatcher,
    max_connections: usize,
}

impl Server {
    pub fn new(listener: TcpListener, dispatcher: Dispatcher, max_connections: usize) -> Self {
        Self {
            listener,
            dispatcher,
            max_connections,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Roda até `shutdown` completar ou uma conexão falhar ao gravar no AOF.
    ///
    /// Em ambos os casos para de aceitar, avisa todas as conexões e espera
    /// cada task terminar antes de retornar.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), PersistenceError> {
        let semaphore = Arc::new(Semaphore::new(self.max_connections));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal recebido");
                    break Ok(());
                }
                Some(joined) = connections.join_next() => {
                    if let Some(e) = persistence_failure(joined) {
                        break Err(e);
                    }
                }
                accepted = self.listener.accept() => {
                    let (socket, addr) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            error!("erro ao aceitar conexão: {e}");
                            continue;
                        }
                    };

                    let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                        warn!("limite de {} conexões atingido, recusando {addr}", self.max_connections);
                        continue;
                    };

                    info!("nova conexão: {addr}");
                    let dispatcher = self.dispatcher.clone();
                    let mut shutdown_rx = shutdown_tx.subscribe();

                    connections.spawn(async move {
                        let conn = Connection::new(socket);
                        let result = handle_connection(conn, dispatcher, &mut shutdown_rx).await;
                        if let Err(ref e) = result {
                            error!("erro na conexão {addr}: {e}");
                        }
                        info!("conexão encerrada: {addr}");
                        drop(permit);
                        result
                    });
                }
            }
        };

        let _ = shutdown_tx.send(());
        while let Some(joined) = connections.join_next().await {
            if let Some(e) = persistence_failure(joined) {
                error!("falha no AOF durante o shutdown: {e}");
            }
        }
        info!("todas as conexões encerradas");

        result
    }
}

/// Completa quando `signal` dispara. Se o handler não pôde ser instalado,
/// nunca completa: o servidor não deve parar sozinho logo após o bind.
pub async fn shutdown_signal(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        error!("falha ao instalar handler de sinal: {e}");
        std::future::pending::<()>().await;
    }
}

/// Extrai a falha de AOF de uma conexão encerrada; o resto já foi logado.
fn persistence_failure(joined: ConnectionResult) -> Option<PersistenceError> {
    match joined {
        Ok(Err(ConnectionError::Persistence(e))) => Some(e),
        Ok(_) => None,
        Err(e) => {
            error!("task de conexão abortou: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn shutdown_signal_completes_when_signal_fires() {
        let fired = shutdown_signal(async { Ok(()) });
        assert!(timeout(Duration::from_millis(100), fired).await.is_ok());
    }

    #[tokio::test]
    async fn shutdown_signal_waits_forever_when_handler_fails() {
        let failed = shutdown_signal(async { Err(io::Error::other("sem handler")) });
        assert!(timeout(Duration::from_millis(100), failed).await.is_err());
    }
}
