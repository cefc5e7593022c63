use std::collections::HashMap;

use tokio::sync::mpsc::error::TrySendError;

use system::ConnectionId;

use crate::connection::ConnectionEvent;

pub type ConnectionTx = tokio::sync::mpsc::Sender<ConnectionEvent>;

pub struct ConnectionTxStorage {
    connection_txs: HashMap<ConnectionId, ConnectionTx>,
}

impl ConnectionTxStorage {
    pub fn new() -> Self {
        Self {
            connection_txs: HashMap::new(),
        }
    }

    pub fn insert(&mut self, connection_id: ConnectionId, tx: ConnectionTx) {
        self.connection_txs.insert(connection_id, tx);
    }

    /// Best-effort, at-most-once delivery. A saturated egress drops the
    /// message; a closed egress also prunes the entry, so connections that
    /// vanished without a disconnect don't accumulate here.
    pub fn send(&mut self, to: &ConnectionId, message: ConnectionEvent) {
        let closed = match self.connection_txs.get_mut(to) {
            Some(tx) => match tx.try_send(message) {
                Ok(()) => false,
                Err(TrySendError::Full(_)) => {
                    log::debug!("connection {}: egress full, dropping message", to);
                    false
                }
                Err(TrySendError::Closed(_)) => true,
            },
            None => return,
        };
        if closed {
            log::debug!("connection {}: egress closed, pruning", to);
            self.connection_txs.remove(to);
        }
    }

    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<ConnectionTx> {
        self.connection_txs.remove(connection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::channel;

    #[test]
    fn it_prunes_an_entry_whose_egress_is_closed() {
        let mut storage = ConnectionTxStorage::new();
        let (tx, rx) = channel(1);
        storage.insert(7, tx);
        drop(rx);

        storage.send(&7, ConnectionEvent::Disconnected);
        assert!(storage.connection_txs.is_empty());
    }

    #[test]
    fn it_keeps_an_entry_whose_egress_is_merely_full() {
        let mut storage = ConnectionTxStorage::new();
        let (tx, _rx) = channel(1);
        storage.insert(7, tx);

        storage.send(&7, ConnectionEvent::Disconnected);
        // second send overflows the buffer and is dropped, not pruned
        storage.send(&7, ConnectionEvent::Disconnected);
        assert_eq!(storage.connection_txs.len(), 1);
    }
}
