/// Erros do codec RESP.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// O buffer ainda não contém um frame completo.
    #[error("frame incompleto")]
    Incomplete,
    /// O stream terminou no meio de um frame.
    #[error("stream truncado no meio de um frame")]
    Truncated,
    #[error("comprimento inválido: {0}")]
    MalformedLength(String),
    #[error("byte de tipo desconhecido: {0:#x}")]
    UnknownTypeTag(u8),
    #[error("bulk string sem terminador CRLF")]
    MissingTerminator,
    #[error("frame excede tamanho máximo ({0} bytes)")]
    FrameTooLarge(usize),
}

/// Erros de validação de requisições.
///
/// O `Display` de cada variante é exatamente a mensagem enviada ao cliente
/// no frame de erro.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("ERR invalid command format")]
    InvalidFormat,
    /// Carrega o nome do comando já em minúsculas.
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,
    #[error("ERR unknown command '{name}', with args beginning with:{args}")]
    Unknown { name: String, args: String },
}

/// Erros do log de persistência (AOF).
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O no AOF: {0}")]
    Io(#[from] std::io::Error),
    #[error("AOF corrompido no byte {offset}: {source}")]
    Corrupt {
        offset: u64,
        #[source]
        source: ProtocolError,
    },
}

/// Erros de conexão TCP.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Falha no AOF durante uma escrita; fatal para o processo.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
