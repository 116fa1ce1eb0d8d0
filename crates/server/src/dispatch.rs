use tracing::{debug, info, warn};

use ledgerkv_common::PersistenceError;
use ledgerkv_protocol::{Command, Frame};
use ledgerkv_storage::{Aof, Db, now_ms};

/// Roteia requisições para o Db e mantém o AOF em sincronia com a memória.
#[derive(Clone)]
pub struct Dispatcher {
    db: Db,
    aof: Aof,
}

impl Dispatcher {
    pub fn new(db: Db, aof: Aof) -> Self {
        Self { db, aof }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn aof(&self) -> &Aof {
        &self.aof
    }

    /// Relê o AOF e re-executa cada comando no Db, descartando as respostas.
    /// Deve rodar antes de aceitar conexões.
    pub async fn restore(&self) -> Result<usize, PersistenceError> {
        let frames = self.aof.replay().await?;
        let mut count = 0;

        for frame in frames {
            match Command::from_frame(frame) {
                Ok(cmd) => {
                    self.execute(&cmd);
                    count += 1;
                }
                Err(e) => warn!("AOF: comando inválido ignorado: {e}"),
            }
        }

        info!(
            "AOF replay completo ({}): {count} comandos restaurados",
            self.aof.path().display()
        );
        Ok(count)
    }

    /// Processa uma requisição e retorna a resposta.
    ///
    /// Erros de validação viram frames de erro. Só falhas do AOF sobem como
    /// `Err`, e elas invalidam o estado persistido.
    pub async fn dispatch(&self, frame: Frame) -> Result<Frame, PersistenceError> {
        let cmd = match Command::from_frame(frame.clone()) {
            Ok(cmd) => cmd,
            Err(e) => return Ok(Frame::Error(e.to_string())),
        };

        debug!("comando recebido: {cmd:?}");

        match cmd {
            Command::Flush => {
                // Limpar memória e truncar o log sob o mesmo lock: nenhuma
                // escrita concorrente fica só em um dos dois.
                let mut log = self.aof.lock().await;
                let response = self.execute(&Command::Flush);
                log.truncate().await?;
                Ok(response)
            }
            Command::PExpire { key, ms } => {
                // Gravado com prazo absoluto para o replay não estender o TTL.
                let cmd = Command::PExpireAt {
                    key,
                    at_ms: now_ms().saturating_add(ms),
                };
                let entry = cmd.to_frame();
                self.write(&cmd, &entry).await
            }
            cmd if cmd.is_write() => self.write(&cmd, &frame).await,
            cmd => Ok(self.execute(&cmd)),
        }
    }

    /// Aplica um comando de escrita e grava `entry` no AOF, tudo com o lock
    /// do log, para que a ordem no arquivo seja a ordem na memória.
    async fn write(&self, cmd: &Command, entry: &Frame) -> Result<Frame, PersistenceError> {
        let mut log = self.aof.lock().await;
        let response = self.execute(cmd);

        let applied = match (cmd, &response) {
            (_, Frame::Error(_)) => false,
            (Command::PExpireAt { .. }, Frame::Integer(n)) => *n == 1,
            _ => true,
        };
        if applied {
            log.append(entry).await?;
        }

        Ok(response)
    }

    /// Executa um comando no Db e monta o Frame de resposta.
    pub fn execute(&self, cmd: &Command) -> Frame {
        match cmd {
            Command::Ping(msg) => match msg {
                Some(m) => Frame::Bulk(m.clone()),
                None => Frame::Simple("PONG".into()),
            },
            Command::Get(key) => match self.db.get(key) {
                Some(value) => Frame::Bulk(value),
                None => Frame::NullBulk,
            },
            Command::Set { key, value } => {
                self.db.set(key.clone(), value.clone());
                Frame::Simple("OK".into())
            }
            Command::Del(keys) => Frame::Integer(self.db.del(keys) as i64),
            Command::Flush => {
                self.db.flush();
                Frame::Simple("OK".into())
            }
            Command::PExpire { key, ms } => Frame::Integer(self.db.pexpire(key, *ms) as i64),
            Command::PExpireAt { key, at_ms } => {
                Frame::Integer(self.db.pexpire_at(key, *at_ms) as i64)
            }
            Command::PTtl(key) => Frame::Integer(self.db.pttl(key)),
        }
    }
}
