use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

/// Mapa chave → valor.
pub type Store = DashMap<Bytes, Bytes>;

/// Mapa chave → instante absoluto de expiração (ms desde a epoch Unix).
pub type ExpiryTable = DashMap<Bytes, i64>;

/// Estado compartilhado entre todas as conexões.
///
/// Os dois mapas têm locks independentes; nenhuma operação segura uma
/// referência de um mapa enquanto mexe no outro.
struct SharedState {
    data: Store,
    expiry: ExpiryTable,
}

/// Handle para o banco de dados in-memory.
///
/// A expiração é preguiçosa: uma chave vencida só é removida quando é
/// consultada de novo (GET, PTTL, PEXPIRE).
#[derive(Clone)]
pub struct Db {
    shared: Arc<SharedState>,
}

/// Relógio de parede em ms desde a epoch Unix.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

impl Db {
    pub fn new() -> Self {
        Self::with_maps(Store::new(), ExpiryTable::new())
    }

    /// Cria um Db sobre mapas fornecidos pelo chamador.
    pub fn with_maps(data: Store, expiry: ExpiryTable) -> Self {
        Db {
            shared: Arc::new(SharedState { data, expiry }),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        if self.evict_if_expired(key) {
            return None;
        }
        let seen = self.expires_at(key);
        match self.shared.data.get(key) {
            Some(value) => Some(value.value().clone()),
            None => {
                self.drop_orphan_expiry(key, seen);
                None
            }
        }
    }

    /// Upsert incondicional. Não mexe no TTL de uma chave viva: uma
    /// expiração anterior continua valendo para o novo valor. Uma chave já
    /// vencida é removida antes, então o novo valor nasce sem TTL.
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.evict_if_expired(&key);
        self.shared.data.insert(key, value);
    }

    /// Remove as chaves e retorna quantas existiam.
    pub fn del(&self, keys: &[Bytes]) -> usize {
        let mut count = 0;
        for key in keys {
            if self.shared.data.remove(key).is_some() {
                count += 1;
            }
            self.shared.expiry.remove(key);
        }
        count
    }

    /// Remove todas as chaves e todos os TTLs.
    pub fn flush(&self) {
        self.shared.data.clear();
        self.shared.expiry.clear();
    }

    /// Define o TTL de uma chave existente, relativo a agora.
    pub fn pexpire(&self, key: &Bytes, ms: i64) -> bool {
        self.pexpire_at(key, now_ms().saturating_add(ms))
    }

    /// Define o instante absoluto de expiração de uma chave existente.
    /// Retorna false (sem gravar nada) se a chave não existe.
    ///
    /// Um instante que já passou apaga a chave na hora. Assim o replay de
    /// um PEXPIREAT antigo tem o mesmo efeito da evicção preguiçosa, que
    /// nunca vai para o log.
    pub fn pexpire_at(&self, key: &Bytes, at_ms: i64) -> bool {
        self.evict_if_expired(key);
        if !self.shared.data.contains_key(key) {
            return false;
        }
        if at_ms <= now_ms() {
            self.shared.expiry.remove(key);
            let removed = self.shared.data.remove(key).is_some();
            if removed {
                debug!("key expirada removida: {}", String::from_utf8_lossy(key));
            }
            return removed;
        }
        self.shared.expiry.insert(key.clone(), at_ms);
        true
    }

    /// Milissegundos restantes; -1 se a chave não expira; -2 se não existe.
    pub fn pttl(&self, key: &[u8]) -> i64 {
        let seen = self.expires_at(key);
        if !self.shared.data.contains_key(key) {
            self.drop_orphan_expiry(key, seen);
            return -2;
        }

        let Some(at) = self.shared.expiry.get(key).map(|at| *at) else {
            return -1;
        };

        let remaining = at.saturating_sub(now_ms());
        if remaining <= 0 {
            self.evict_if_expired(key);
            return -2;
        }
        remaining
    }

    /// Instante de expiração registrado para a chave, se houver.
    pub fn expires_at(&self, key: &[u8]) -> Option<i64> {
        self.shared.expiry.get(key).map(|at| *at)
    }

    pub fn len(&self) -> usize {
        self.shared.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.data.is_empty()
    }

    /// Remove um registro de expiração órfão, mas só se ainda for o mesmo
    /// prazo visto antes da consulta ao mapa de dados. Um SET + PEXPIRE
    /// concorrente grava um prazo novo, que fica.
    fn drop_orphan_expiry(&self, key: &[u8], seen: Option<i64>) {
        if let Some(seen) = seen {
            self.shared.expiry.remove_if(key, |_, at| *at == seen);
        }
    }

    /// Remove a chave se o TTL venceu. Só apaga o valor se foi esta
    /// chamada que retirou o registro de expiração, então um PEXPIRE
    /// concorrente com prazo novo não é perdido.
    fn evict_if_expired(&self, key: &[u8]) -> bool {
        let now = now_ms();
        if self
            .shared
            .expiry
            .remove_if(key, |_, at| *at <= now)
            .is_some()
        {
            self.shared.data.remove(key);
            debug!("key expirada removida: {}", String::from_utf8_lossy(key));
            return true;
        }
        false
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}
