use bytes::Bytes;
use ledgerkv_common::CommandError;

use crate::{Frame, Parse};

/// Enum com todos os comandos suportados.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping(Option<Bytes>),
    Get(Bytes),
    Set { key: Bytes, value: Bytes },
    Del(Vec<Bytes>),
    Flush,
    /// TTL relativo, em milissegundos a partir de agora.
    PExpire { key: Bytes, ms: i64 },
    /// Instante absoluto de expiração, em ms desde a epoch Unix.
    PExpireAt { key: Bytes, at_ms: i64 },
    PTtl(Bytes),
}

impl Command {
    /// Valida e converte uma requisição em Command.
    ///
    /// Qualquer erro aqui vira uma resposta de erro para o cliente; a
    /// conexão continua aberta.
    pub fn from_frame(frame: Frame) -> Result<Command, CommandError> {
        let mut parse = Parse::new(frame)?;
        let cmd_name = parse.name().to_uppercase();

        let cmd = match cmd_name.as_str() {
            "PING" => match parse.remaining() {
                0 => Command::Ping(None),
                1 => Command::Ping(Some(parse.next_bytes()?)),
                _ => return Err(parse.wrong_arity()),
            },
            "GET" => {
                expect_args(&parse, 1)?;
                Command::Get(parse.next_bytes()?)
            }
            "SET" => {
                expect_args(&parse, 2)?;
                let key = parse.next_bytes()?;
                let value = parse.next_bytes()?;
                Command::Set { key, value }
            }
            "DEL" => {
                if !parse.has_remaining() {
                    return Err(parse.wrong_arity());
                }
                Command::Del(parse.rest())
            }
            "FLUSH" => {
                expect_args(&parse, 0)?;
                Command::Flush
            }
            "PEXPIRE" => {
                expect_args(&parse, 2)?;
                let key = parse.next_bytes()?;
                let ms = parse.next_int()?;
                Command::PExpire { key, ms }
            }
            "PEXPIREAT" => {
                expect_args(&parse, 2)?;
                let key = parse.next_bytes()?;
                let at_ms = parse.next_int()?;
                Command::PExpireAt { key, at_ms }
            }
            "PTTL" => {
                expect_args(&parse, 1)?;
                Command::PTtl(parse.next_bytes()?)
            }
            _ => {
                return Err(CommandError::Unknown {
                    name: parse.name().to_string(),
                    args: quote_args(&parse.rest()),
                });
            }
        };

        parse.finish()?;
        Ok(cmd)
    }

    /// Encoda o comando como Frame para envio via RESP.
    pub fn to_frame(&self) -> Frame {
        match self {
            Command::Ping(None) => Frame::Array(vec![Frame::bulk("PING")]),
            Command::Ping(Some(msg)) => {
                Frame::Array(vec![Frame::bulk("PING"), Frame::Bulk(msg.clone())])
            }
            Command::Get(key) => Frame::Array(vec![Frame::bulk("GET"), Frame::Bulk(key.clone())]),
            Command::Set { key, value } => Frame::Array(vec![
                Frame::bulk("SET"),
                Frame::Bulk(key.clone()),
                Frame::Bulk(value.clone()),
            ]),
            Command::Del(keys) => {
                let mut parts = vec![Frame::bulk("DEL")];
                parts.extend(keys.iter().map(|k| Frame::Bulk(k.clone())));
                Frame::Array(parts)
            }
            Command::Flush => Frame::Array(vec![Frame::bulk("FLUSH")]),
            Command::PExpire { key, ms } => Frame::Array(vec![
                Frame::bulk("PEXPIRE"),
                Frame::Bulk(key.clone()),
                Frame::bulk(&ms.to_string()),
            ]),
            Command::PExpireAt { key, at_ms } => Frame::Array(vec![
                Frame::bulk("PEXPIREAT"),
                Frame::Bulk(key.clone()),
                Frame::bulk(&at_ms.to_string()),
            ]),
            Command::PTtl(key) => Frame::Array(vec![Frame::bulk("PTTL"), Frame::Bulk(key.clone())]),
        }
    }

    /// Determina se o comando deve ser persistido no AOF.
    ///
    /// FLUSH não entra aqui: ele trunca o log em vez de ser gravado.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Set { .. }
                | Command::Del(_)
                | Command::PExpire { .. }
                | Command::PExpireAt { .. }
        )
    }
}

fn expect_args(parse: &Parse, n: usize) -> Result<(), CommandError> {
    if parse.remaining() != n {
        return Err(parse.wrong_arity());
    }
    Ok(())
}

/// Formata os argumentos de um comando desconhecido: ` 'a' 'b'`, ou vazio.
fn quote_args(args: &[Bytes]) -> String {
    args.iter()
        .map(|arg| format!(" '{}'", String::from_utf8_lossy(arg)))
        .collect()
}
