use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tracing::error;

use ledgerkv_common::ConnectionError;
use ledgerkv_protocol::Frame;

use crate::{Connection, Dispatcher};

/// Loop principal de tratamento de uma conexão.
///
/// Respostas saem na ordem das requisições. Retorna Ok no EOF limpo ou no
/// shutdown; erros de protocolo encerram a conexão sem resposta.
pub async fn handle_connection<S>(
    mut conn: Connection<S>,
    dispatcher: Dispatcher,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            result = conn.read_frame() => result?,
            _ = shutdown.recv() => {
                return Ok(());
            }
        };

        let frame = match frame {
            Some(f) => f,
            None => return Ok(()), // EOF
        };

        let response = match dispatcher.dispatch(frame).await {
            Ok(response) => response,
            Err(e) => {
                error!("falha ao gravar no AOF: {e}");
                let reply = Frame::Error("ERR persistence failure, server shutting down".into());
                let _ = conn.write_frame(&reply).await;
                return Err(e.into());
            }
        };

        conn.write_frame(&response).await?;
    }
}
