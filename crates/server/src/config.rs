use std::path::PathBuf;

use clap::Parser;

use ledgerkv_common::{DEFAULT_HOST, DEFAULT_PORT, MAX_CONNECTIONS};
use ledgerkv_storage::FsyncPolicy;

#[derive(Parser, Debug, Clone)]
#[command(name = "ledgerkv-server", about = "LedgerKV: key-value in-memory com AOF")]
pub struct Config {
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,
    #[arg(long, short, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Diretório onde o AOF é criado
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
    /// Caminho explícito do AOF (ignora --dir)
    #[arg(long, value_name = "FILE")]
    pub aof: Option<PathBuf>,
    #[arg(long, default_value = "everysec", value_parser = parse_fsync)]
    pub fsync: FsyncPolicy,
    #[arg(long, default_value_t = MAX_CONNECTIONS)]
    pub max_connections: usize,
}

impl Config {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Caminho do AOF: `--aof` se dado, senão `<dir>/db_<host>_<port>.aof`.
    pub fn aof_path(&self) -> PathBuf {
        match &self.aof {
            Some(path) => path.clone(),
            None => self
                .dir
                .join(format!("db_{}_{}.aof", self.host, self.port)),
        }
    }
}

fn parse_fsync(s: &str) -> Result<FsyncPolicy, String> {
    match s.to_lowercase().as_str() {
        "always" => Ok(FsyncPolicy::Always),
        "everysec" => Ok(FsyncPolicy::EverySec),
        "no" => Ok(FsyncPolicy::No),
        _ => Err(format!("valor inválido: '{s}'. Use: always, everysec, no")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["ledgerkv-server"]).unwrap();
        assert_eq!(config.port, 6379);
        assert_eq!(config.addr(), "127.0.0.1:6379");
        assert_eq!(config.fsync, FsyncPolicy::EverySec);
        assert_eq!(config.aof_path(), PathBuf::from("./db_127.0.0.1_6379.aof"));
    }

    #[test]
    fn aof_path_follows_port_and_dir() {
        let config =
            Config::try_parse_from(["ledgerkv-server", "-p", "7000", "--dir", "/var/lib/kv"])
                .unwrap();
        assert_eq!(
            config.aof_path(),
            PathBuf::from("/var/lib/kv/db_127.0.0.1_7000.aof")
        );
    }

    #[test]
    fn explicit_aof_wins() {
        let config =
            Config::try_parse_from(["ledgerkv-server", "--aof", "/tmp/x.aof", "--fsync", "always"])
                .unwrap();
        assert_eq!(config.aof_path(), PathBuf::from("/tmp/x.aof"));
        assert_eq!(config.fsync, FsyncPolicy::Always);
    }

    #[test]
    fn rejects_unknown_fsync() {
        assert!(Config::try_parse_from(["ledgerkv-server", "--fsync", "sometimes"]).is_err());
    }
}
