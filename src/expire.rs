/*!
 * Active expiry sweeper.
 *
 * A background thread samples keys with TTLs in every database, deletes the
 * due ones, and repeats a round while more than a quarter of the sample was
 * expired. After a round that removed anything it nudges the reactor over a
 * channel + waker pair so blocked-client bookkeeping and mailbox flushes
 * run promptly.
 */

use crate::config::NotifyFlags;
use crate::server::Server;
use anyhow::Result;
use crossbeam::channel::Sender;
use mio::Waker;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Spawn the sweeper thread. Each tick message carries the number of keys
/// removed in that round.
pub fn spawn_expiry_sweeper(server: Arc<Server>, tx: Sender<u64>, waker: Arc<Waker>) -> Result<()> {
    std::thread::Builder::new()
        .name("expiry-sweeper".into())
        .spawn(move || {
            let mut rng = rand::thread_rng();
            loop {
                if server.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                // `hz` controls the sweep cadence, read live from config
                let interval = 1000 / server.config.hz().max(1);
                std::thread::sleep(Duration::from_millis(interval));
                let mut removed_total = 0u64;
                for (index, db) in server.dbs.iter().enumerate() {
                    loop {
                        let (expired, sampled) = db.write().expire_cycle(&mut rng);
                        let hit = expired.len();
                        for key in &expired {
                            server.notify_keyspace_event(index, NotifyFlags::EXPIRED, "expired", key);
                        }
                        removed_total += hit as u64;
                        if sampled == 0 || hit * 4 <= sampled {
                            break;
                        }
                    }
                }
                if removed_total > 0 {
                    server.stats.expired_keys.fetch_add(removed_total, Ordering::Relaxed);
                    log::debug!("expiry sweep removed {} keys", removed_total);
                    if tx.send(removed_total).is_ok() {
                        let _ = waker.wake();
                    }
                }
            }
        })?;
    Ok(())
}
