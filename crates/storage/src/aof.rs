use std::io::{Cursor, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tracing::{debug, error, info};

use ledgerkv_common::{PersistenceError, ProtocolError};
use ledgerkv_protocol::Frame;

/// Política de fsync.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum FsyncPolicy {
    /// Fsync após cada write.
    Always,
    /// Fsync a cada segundo, pela task de fundo.
    #[default]
    EverySec,
    /// Sem fsync explícito (deixa pro OS).
    No,
}

/// Log append-only com os comandos de escrita, no próprio formato RESP.
///
/// Um único mutex serializa append, replay, truncamento e fsync sobre o
/// arquivo, então o cursor e o conteúdo nunca ficam inconsistentes.
#[derive(Clone)]
pub struct Aof {
    file: Arc<Mutex<File>>,
    path: PathBuf,
    policy: FsyncPolicy,
}

/// Acesso exclusivo ao AOF enquanto vivo.
pub struct AofGuard<'a> {
    file: MutexGuard<'a, File>,
    policy: FsyncPolicy,
}

impl Aof {
    /// Abre (ou cria) o arquivo para leitura e escrita, com o cursor no fim.
    pub async fn open(path: impl AsRef<Path>, policy: FsyncPolicy) -> std::io::Result<Aof> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;
        file.seek(SeekFrom::End(0)).await?;

        info!("AOF aberto: {:?} (fsync {policy:?})", path);

        Ok(Aof {
            file: Arc::new(Mutex::new(file)),
            path,
            policy,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> FsyncPolicy {
        self.policy
    }

    /// Adquire o lock do arquivo. Usado pelo dispatcher para aplicar uma
    /// escrita na memória e gravá-la no log dentro da mesma seção crítica.
    pub async fn lock(&self) -> AofGuard<'_> {
        AofGuard {
            file: self.file.lock().await,
            policy: self.policy,
        }
    }

    pub async fn append(&self, frame: &Frame) -> Result<(), PersistenceError> {
        self.lock().await.append(frame).await
    }

    pub async fn reset(&self) -> Result<(), PersistenceError> {
        self.lock().await.truncate().await
    }

    /// Lê o arquivo inteiro desde o início e decodifica os frames em ordem.
    ///
    /// Qualquer byte que não forme um frame completo é tratado como
    /// corrupção: não dá para saber quais escritas se perderam.
    pub async fn replay(&self) -> Result<Vec<Frame>, PersistenceError> {
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(0)).await?;

        let mut data = Vec::new();
        // Deixa o cursor no fim do arquivo para os próximos appends.
        file.read_to_end(&mut data).await?;
        drop(file);

        let frames = decode_all(&data)?;
        info!("AOF lido: {} comandos em {} bytes", frames.len(), data.len());
        Ok(frames)
    }

    /// Força os bytes já escritos para o disco.
    pub async fn sync(&self) -> std::io::Result<()> {
        let file = self.file.lock().await;
        file.sync_data().await
    }

    /// Task de fundo que faz fsync periódico até receber o sinal de shutdown
    /// (ou o sender ser dropado). Faz um último fsync ao encerrar.
    pub fn spawn_fsync_task(
        &self,
        period: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let aof = self.clone();
        tokio::spawn(async move {
            let mut tick = interval(period);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(e) = aof.sync().await {
                            error!("AOF fsync falhou: {e}");
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }

            if let Err(e) = aof.sync().await {
                error!("AOF fsync final falhou: {e}");
            }
            info!("task de fsync do AOF encerrada");
        })
    }
}

impl AofGuard<'_> {
    /// Encoda o frame e escreve no fim do arquivo.
    pub async fn append(&mut self, frame: &Frame) -> Result<(), PersistenceError> {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        self.file.write_all(&buf).await?;
        self.file.flush().await?;

        if self.policy == FsyncPolicy::Always {
            self.file.sync_data().await?;
        }
        debug!("AOF append: {} bytes", buf.len());
        Ok(())
    }

    /// Trunca o log para zero e volta o cursor para o início.
    pub async fn truncate(&mut self) -> Result<(), PersistenceError> {
        self.file.set_len(0).await?;
        self.file.seek(SeekFrom::Start(0)).await?;
        self.file.sync_all().await?;
        info!("AOF truncado");
        Ok(())
    }
}

fn decode_all(data: &[u8]) -> Result<Vec<Frame>, PersistenceError> {
    let mut cursor = Cursor::new(data);
    let mut frames = Vec::new();

    while (cursor.position() as usize) < data.len() {
        let start = cursor.position();
        let corrupt = |source| PersistenceError::Corrupt {
            offset: start,
            source,
        };

        match Frame::check(&mut cursor) {
            Ok(()) => {
                cursor.set_position(start);
                let frame = Frame::parse(&mut cursor).map_err(corrupt)?;
                frames.push(frame);
            }
            Err(ProtocolError::Incomplete) => return Err(corrupt(ProtocolError::Truncated)),
            Err(e) => return Err(corrupt(e)),
        }
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_and_replay_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.aof");
        let aof = Aof::open(&path, FsyncPolicy::Always).await.unwrap();

        let frames = vec![
            Frame::array_from_strs(&["SET", "x", "1"]),
            Frame::array_from_strs(&["SET", "x", "2"]),
            Frame::array_from_strs(&["DEL", "x"]),
        ];
        for frame in &frames {
            aof.append(frame).await.unwrap();
        }

        assert_eq!(aof.replay().await.unwrap(), frames);

        // O conteúdo em disco é a concatenação dos frames encodados.
        let mut expected = BytesMut::new();
        for frame in &frames {
            frame.encode(&mut expected);
        }
        assert_eq!(tokio::fs::read(&path).await.unwrap(), expected.to_vec());
    }

    #[tokio::test]
    async fn append_after_replay_goes_to_end() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.aof");
        let aof = Aof::open(&path, FsyncPolicy::No).await.unwrap();

        aof.append(&Frame::array_from_strs(&["SET", "a", "1"]))
            .await
            .unwrap();
        aof.replay().await.unwrap();
        aof.append(&Frame::array_from_strs(&["SET", "b", "2"]))
            .await
            .unwrap();

        let frames = aof.replay().await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], Frame::array_from_strs(&["SET", "b", "2"]));
    }

    #[tokio::test]
    async fn reopen_preserves_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.aof");
        {
            let aof = Aof::open(&path, FsyncPolicy::Always).await.unwrap();
            aof.append(&Frame::array_from_strs(&["SET", "k", "v"]))
                .await
                .unwrap();
        }

        let aof = Aof::open(&path, FsyncPolicy::Always).await.unwrap();
        aof.append(&Frame::array_from_strs(&["SET", "k2", "v2"]))
            .await
            .unwrap();
        assert_eq!(aof.replay().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reset_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.aof");
        let aof = Aof::open(&path, FsyncPolicy::EverySec).await.unwrap();

        aof.append(&Frame::array_from_strs(&["SET", "k", "v"]))
            .await
            .unwrap();
        aof.reset().await.unwrap();
        assert!(aof.replay().await.unwrap().is_empty());
        assert_eq!(tokio::fs::metadata(&path).await.unwrap().len(), 0);

        aof.append(&Frame::array_from_strs(&["SET", "k", "w"]))
            .await
            .unwrap();
        assert_eq!(
            aof.replay().await.unwrap(),
            vec![Frame::array_from_strs(&["SET", "k", "w"])]
        );
    }

    #[tokio::test]
    async fn open_keeps_path_and_policy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.aof");
        let aof = Aof::open(&path, FsyncPolicy::EverySec).await.unwrap();
        assert_eq!(aof.path(), path.as_path());
        assert_eq!(aof.policy(), FsyncPolicy::EverySec);
    }

    #[tokio::test]
    async fn replay_empty_file() {
        let dir = tempdir().unwrap();
        let aof = Aof::open(dir.path().join("new.aof"), FsyncPolicy::No)
            .await
            .unwrap();
        assert!(aof.replay().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replay_truncated_tail_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupted.aof");

        let mut buf = BytesMut::new();
        Frame::array_from_strs(&["SET", "key1", "val"]).encode(&mut buf);
        let valid_len = buf.len() as u64;
        buf.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$5\r\nhel");
        tokio::fs::write(&path, &buf).await.unwrap();

        let aof = Aof::open(&path, FsyncPolicy::No).await.unwrap();
        match aof.replay().await {
            Err(PersistenceError::Corrupt { offset, source }) => {
                assert_eq!(offset, valid_len);
                assert!(matches!(source, ProtocolError::Truncated));
            }
            other => panic!("esperado Corrupt, veio {other:?}"),
        }
    }

    #[tokio::test]
    async fn replay_garbage_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.aof");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let aof = Aof::open(&path, FsyncPolicy::No).await.unwrap();
        assert!(matches!(
            aof.replay().await,
            Err(PersistenceError::Corrupt {
                offset: 0,
                source: ProtocolError::UnknownTypeTag(b'h'),
            })
        ));
    }

    #[tokio::test]
    async fn guard_serializes_writers() {
        let dir = tempdir().unwrap();
        let aof = Aof::open(dir.path().join("c.aof"), FsyncPolicy::No)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for t in 0..4 {
            let aof = aof.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    let k = format!("{t}:{i}");
                    aof.append(&Frame::array_from_strs(&["SET", &k, "v"]))
                        .await
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Nenhum frame intercalado: tudo decodifica.
        assert_eq!(aof.replay().await.unwrap().len(), 100);
    }

    #[tokio::test]
    async fn fsync_task_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let aof = Aof::open(dir.path().join("f.aof"), FsyncPolicy::EverySec)
            .await
            .unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = aof.spawn_fsync_task(Duration::from_millis(10), shutdown_rx);
        aof.append(&Frame::array_from_strs(&["SET", "k", "v"]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task de fsync não encerrou")
            .unwrap();
    }
}
