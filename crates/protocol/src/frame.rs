use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;
use ledgerkv_common::{MAX_BULK_SIZE, ProtocolError};

/// Valor RESP2 trocado com clientes e gravado no AOF.
///
/// Bulk strings e arrays têm um estado nulo próprio, distinto de
/// `Bulk` vazio e `Array` vazio.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    NullBulk,
    Array(Vec<Frame>),
    NullArray,
}

impl Frame {
    /// Verifica se um frame completo está disponível no buffer sem alocar.
    /// Retorna Ok(()) se completo, Err(Incomplete) se precisa mais dados.
    ///
    /// Só bulk strings e arrays são aceitos na entrada; os demais tipos
    /// existem apenas como resposta.
    pub fn check(src: &mut Cursor<&[u8]>) -> Result<(), ProtocolError> {
        match get_u8(src)? {
            b'$' => {
                let Some(len) = get_length(src)? else {
                    return Ok(());
                };
                skip(src, len)?;
                expect_crlf(src)
            }
            b'*' => {
                let count = get_count(src)?;
                for _ in 0..count.unwrap_or(0) {
                    Frame::check(src)?;
                }
                Ok(())
            }
            byte => Err(ProtocolError::UnknownTypeTag(byte)),
        }
    }

    /// Faz o parse de um frame completo a partir do cursor.
    /// Deve ser chamado apenas após `check()` retornar Ok.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, ProtocolError> {
        match get_u8(src)? {
            b'$' => {
                let Some(len) = get_length(src)? else {
                    return Ok(Frame::NullBulk);
                };
                if src.remaining() < len {
                    return Err(ProtocolError::Incomplete);
                }
                let start = src.position() as usize;
                let data = Bytes::copy_from_slice(&src.get_ref()[start..start + len]);
                src.set_position((start + len) as u64);
                expect_crlf(src)?;
                Ok(Frame::Bulk(data))
            }
            b'*' => {
                let Some(count) = get_count(src)? else {
                    return Ok(Frame::NullArray);
                };
                // Não confia no count declarado para pré-alocar.
                let mut frames = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    frames.push(Frame::parse(src)?);
                }
                Ok(Frame::Array(frames))
            }
            byte => Err(ProtocolError::UnknownTypeTag(byte)),
        }
    }

    /// Encoda o frame no buffer de saída em formato RESP2.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(b'+');
                dst.put(s.as_bytes());
                dst.put(&b"\r\n"[..]);
            }
            Frame::Error(s) => {
                dst.put_u8(b'-');
                dst.put(s.as_bytes());
                dst.put(&b"\r\n"[..]);
            }
            Frame::Integer(n) => {
                dst.put_u8(b':');
                dst.put(n.to_string().as_bytes());
                dst.put(&b"\r\n"[..]);
            }
            Frame::Bulk(data) => {
                dst.put_u8(b'$');
                dst.put(data.len().to_string().as_bytes());
                dst.put(&b"\r\n"[..]);
                dst.put(data.as_ref());
                dst.put(&b"\r\n"[..]);
            }
            Frame::NullBulk => {
                dst.put(&b"$-1\r\n"[..]);
            }
            Frame::Array(frames) => {
                dst.put_u8(b'*');
                dst.put(frames.len().to_string().as_bytes());
                dst.put(&b"\r\n"[..]);
                for frame in frames {
                    frame.encode(dst);
                }
            }
            Frame::NullArray => {
                dst.put(&b"*-1\r\n"[..]);
            }
        }
    }

    /// Encoda o frame em um buffer novo.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Helper: cria um Frame::Bulk a partir de &str.
    pub fn bulk(s: &str) -> Frame {
        Frame::Bulk(Bytes::from(s.to_string()))
    }

    /// Helper: cria um Array de Bulk strings a partir de &[&str].
    pub fn array_from_strs(strs: &[&str]) -> Frame {
        Frame::Array(strs.iter().map(|s| Frame::bulk(s)).collect())
    }
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, ProtocolError> {
    if !src.has_remaining() {
        return Err(ProtocolError::Incomplete);
    }
    Ok(src.get_u8())
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ProtocolError> {
    let start = src.position() as usize;
    let end = src.get_ref().len();

    for i in start..end.saturating_sub(1) {
        if src.get_ref()[i] == b'\r' && src.get_ref()[i + 1] == b'\n' {
            src.set_position((i + 2) as u64);
            return Ok(&src.get_ref()[start..i]);
        }
    }

    Err(ProtocolError::Incomplete)
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<i64, ProtocolError> {
    let line = get_line(src)?;
    let s = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::MalformedLength(String::from_utf8_lossy(line).into()))?;
    s.parse::<i64>()
        .map_err(|_| ProtocolError::MalformedLength(s.to_string()))
}

/// Comprimento de bulk string; `None` para o nulo `-1`.
fn get_length(src: &mut Cursor<&[u8]>) -> Result<Option<usize>, ProtocolError> {
    match get_decimal(src)? {
        -1 => Ok(None),
        n if n < 0 => Err(ProtocolError::MalformedLength(n.to_string())),
        n => {
            let len = n as usize;
            if len > MAX_BULK_SIZE {
                return Err(ProtocolError::FrameTooLarge(len));
            }
            Ok(Some(len))
        }
    }
}

/// Número de elementos de array; `None` para o nulo `-1`.
fn get_count(src: &mut Cursor<&[u8]>) -> Result<Option<usize>, ProtocolError> {
    match get_decimal(src)? {
        -1 => Ok(None),
        n if n < 0 => Err(ProtocolError::MalformedLength(n.to_string())),
        n => Ok(Some(n as usize)),
    }
}

fn expect_crlf(src: &mut Cursor<&[u8]>) -> Result<(), ProtocolError> {
    if src.remaining() < 2 {
        return Err(ProtocolError::Incomplete);
    }
    if &src.chunk()[..2] != b"\r\n" {
        return Err(ProtocolError::MissingTerminator);
    }
    src.advance(2);
    Ok(())
}

fn skip(src: &mut Cursor<&[u8]>, n: usize) -> Result<(), ProtocolError> {
    if src.remaining() < n {
        return Err(ProtocolError::Incomplete);
    }
    src.set_position(src.position() + n as u64);
    Ok(())
}
