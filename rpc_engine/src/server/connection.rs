//! Admission of TCP connection workers.
//!
//! Every accepted connection gets its own worker task; the manager bounds how
//! many may be alive at once, globally and per peer address. A limit of zero
//! disables that bound.

use std::{
    net::IpAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionManagerConfig {
    pub max_total: usize,
    pub max_per_ip: usize,
}

impl ConnectionManagerConfig {
    pub fn unlimited() -> Self {
        Self {
            max_total: 0,
            max_per_ip: 0,
        }
    }
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            max_total: 10_000,
            max_per_ip: 1_000,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("global connection limit of {0} reached")]
    GlobalLimit(usize),
    #[error("per-ip connection limit reached for {0}")]
    PerIpLimit(IpAddr),
}

#[derive(Debug)]
struct Counters {
    config: ConnectionManagerConfig,
    total: AtomicUsize,
    per_ip: DashMap<IpAddr, usize>,
}

#[derive(Clone, Debug)]
pub struct ConnectionManager {
    counters: Arc<Counters>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionManagerConfig) -> Self {
        Self {
            counters: Arc::new(Counters {
                config,
                total: AtomicUsize::new(0),
                per_ip: DashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> ConnectionManagerConfig {
        self.counters.config
    }

    /// Reserves a worker slot for `ip`; the slot is freed when the guard drops.
    pub fn acquire(&self, ip: IpAddr) -> Result<ConnectionGuard, ConnectionError> {
        let limits = self.counters.config;
        let total = self.counters.total.fetch_add(1, Ordering::AcqRel) + 1;
        if limits.max_total != 0 && total > limits.max_total {
            self.counters.total.fetch_sub(1, Ordering::AcqRel);
            return Err(ConnectionError::GlobalLimit(limits.max_total));
        }

        {
            let mut active = self.counters.per_ip.entry(ip).or_insert(0);
            if limits.max_per_ip != 0 && *active >= limits.max_per_ip {
                drop(active);
                self.counters.total.fetch_sub(1, Ordering::AcqRel);
                return Err(ConnectionError::PerIpLimit(ip));
            }
            *active += 1;
        }

        Ok(ConnectionGuard {
            manager: self.clone(),
            ip,
        })
    }

    fn release(&self, ip: IpAddr) {
        self.counters.total.fetch_sub(1, Ordering::AcqRel);
        let emptied = match self.counters.per_ip.get_mut(&ip) {
            Some(mut active) => {
                *active = active.saturating_sub(1);
                *active == 0
            }
            None => false,
        };
        if emptied {
            self.counters.per_ip.remove_if(&ip, |_, active| *active == 0);
        }
    }

    pub fn active_total(&self) -> usize {
        self.counters.total.load(Ordering::Acquire)
    }

    pub fn active_for_ip(&self, ip: IpAddr) -> usize {
        self.counters.per_ip.get(&ip).map(|entry| *entry).unwrap_or(0)
    }
}

/// Holds one worker slot for the lifetime of a connection.
pub struct ConnectionGuard {
    manager: ConnectionManager,
    ip: IpAddr,
}

impl ConnectionGuard {
    pub fn ip(&self) -> IpAddr {
        self.ip
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.release(self.ip);
    }
}
