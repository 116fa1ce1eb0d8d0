use bytes::Bytes;
use ledgerkv_common::CommandError;

use crate::Frame;

/// Cursor sobre uma requisição para extrair argumentos sequencialmente.
///
/// Uma requisição válida é um array não nulo com pelo menos um elemento,
/// todos bulk strings não nulas. O primeiro elemento é o nome do comando.
pub struct Parse {
    name: String,
    parts: Vec<Bytes>,
    pos: usize,
}

impl Parse {
    pub fn new(frame: Frame) -> Result<Parse, CommandError> {
        let Frame::Array(frames) = frame else {
            return Err(CommandError::InvalidFormat);
        };

        let mut parts = Vec::with_capacity(frames.len());
        for frame in frames {
            match frame {
                Frame::Bulk(data) => parts.push(data),
                _ => return Err(CommandError::InvalidFormat),
            }
        }

        if parts.is_empty() {
            return Err(CommandError::InvalidFormat);
        }
        let name = String::from_utf8_lossy(&parts.remove(0)).into_owned();

        Ok(Parse {
            name,
            parts,
            pos: 0,
        })
    }

    /// Nome do comando como recebido (sem normalizar caixa).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Retorna o próximo argumento como Bytes.
    pub fn next_bytes(&mut self) -> Result<Bytes, CommandError> {
        let Some(data) = self.parts.get(self.pos) else {
            return Err(self.wrong_arity());
        };
        self.pos += 1;
        Ok(data.clone())
    }

    /// Retorna o próximo argumento interpretado como i64 decimal.
    pub fn next_int(&mut self) -> Result<i64, CommandError> {
        let data = self.next_bytes()?;
        std::str::from_utf8(&data)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or(CommandError::NotAnInteger)
    }

    /// Verifica se todos os argumentos foram consumidos.
    pub fn finish(&self) -> Result<(), CommandError> {
        if self.has_remaining() {
            Err(self.wrong_arity())
        } else {
            Ok(())
        }
    }

    pub fn has_remaining(&self) -> bool {
        self.pos < self.parts.len()
    }

    /// Número de argumentos ainda não consumidos.
    pub fn remaining(&self) -> usize {
        self.parts.len() - self.pos
    }

    /// Consome todos os argumentos restantes.
    pub fn rest(&mut self) -> Vec<Bytes> {
        let rest = self.parts[self.pos..].to_vec();
        self.pos = self.parts.len();
        rest
    }

    pub fn wrong_arity(&self) -> CommandError {
        CommandError::WrongArity(self.name.to_lowercase())
    }
}
