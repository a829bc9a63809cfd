//! Background image loading.
//!
//! Workers read and encode files off the session thread and send the result
//! back over a channel. The session drains the channel and finishes each
//! load on its own thread. Results from before a reset, or for loads that
//! were discarded, are dropped on arrival.

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tapestry_nav::{ImageError, ImageManager, LoadedImage};

pub type LoadTicket = u64;

#[derive(Debug)]
pub struct ImageLoadResult {
    pub generation: u64,
    pub ticket: LoadTicket,
    pub path: PathBuf,
    pub result: Result<LoadedImage, ImageError>,
}

struct Job {
    generation: u64,
    ticket: LoadTicket,
    path: PathBuf,
}

#[derive(Default)]
struct LoadRegistry {
    generation: u64,
    next_ticket: LoadTicket,
    pending: HashSet<LoadTicket>,
}

impl LoadRegistry {
    /// True if the result should be delivered. Consumes the pending entry.
    fn accept(&mut self, result: &ImageLoadResult) -> bool {
        let pending = self.pending.remove(&result.ticket);
        pending && result.generation == self.generation
    }
}

pub struct ImageLoader {
    jobs: Option<Sender<Job>>,
    results: Receiver<ImageLoadResult>,
    registry: Arc<Mutex<LoadRegistry>>,
    workers: Vec<JoinHandle<()>>,
}

impl ImageLoader {
    pub fn new(worker_count: usize) -> Self {
        let (jobs_tx, jobs_rx) = unbounded::<Job>();
        let (results_tx, results_rx) = unbounded::<ImageLoadResult>();
        let workers = (0..worker_count.max(1))
            .map(|_| spawn_worker(jobs_rx.clone(), results_tx.clone()))
            .collect();
        Self {
            jobs: Some(jobs_tx),
            results: results_rx,
            registry: Arc::new(Mutex::new(LoadRegistry::default())),
            workers,
        }
    }

    /// Queue a file for loading.
    pub fn request(&self, path: PathBuf) -> LoadTicket {
        let (generation, ticket) = {
            let mut reg = self.registry.lock();
            let ticket = reg.next_ticket;
            reg.next_ticket += 1;
            reg.pending.insert(ticket);
            (reg.generation, ticket)
        };
        tracing::debug!("Queued image load {} for {:?}", ticket, path);
        if let Some(jobs) = &self.jobs {
            let _ = jobs.send(Job {
                generation,
                ticket,
                path,
            });
        }
        ticket
    }

    /// Forget a queued load; its result is dropped when it arrives.
    pub fn discard(&self, ticket: LoadTicket) -> bool {
        self.registry.lock().pending.remove(&ticket)
    }

    /// Invalidate every outstanding load, as when a new file is opened.
    pub fn reset(&self) {
        let mut reg = self.registry.lock();
        reg.generation += 1;
        reg.pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.registry.lock().pending.len()
    }

    /// Results that have arrived, in arrival order. Never blocks.
    pub fn drain_ready(&self) -> Vec<ImageLoadResult> {
        let arrived: Vec<ImageLoadResult> = self.results.try_iter().collect();
        self.filter_stale(arrived)
    }

    /// Block until every pending load has reported or `timeout` passes.
    pub fn wait_all(&self, timeout: Duration) -> Vec<ImageLoadResult> {
        let deadline = Instant::now() + timeout;
        let mut delivered = Vec::new();
        while self.pending_count() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(result) => delivered.extend(self.filter_stale(vec![result])),
                Err(_) => {
                    tracing::warn!("Timed out waiting for {} image loads", self.pending_count());
                    break;
                }
            }
        }
        delivered
    }

    fn filter_stale(&self, arrived: Vec<ImageLoadResult>) -> Vec<ImageLoadResult> {
        let mut reg = self.registry.lock();
        arrived
            .into_iter()
            .filter(|result| {
                let keep = reg.accept(result);
                if !keep {
                    tracing::debug!("Dropping stale image load for {:?}", result.path);
                }
                keep
            })
            .collect()
    }
}

impl Drop for ImageLoader {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loops.
        self.jobs.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn spawn_worker(jobs: Receiver<Job>, results: Sender<ImageLoadResult>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while let Ok(job) = jobs.recv() {
            let result = ImageManager::load_image_from_file_start(&job.path);
            if results
                .send(ImageLoadResult {
                    generation: job.generation,
                    ticket: job.ticket,
                    path: job.path,
                    result,
                })
                .is_err()
            {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(dir: &std::path::Path, name: &str, shade: u8) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::from_pixel(2, 2, image::Rgb([shade, shade, shade]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_loads_arrive() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ImageLoader::new(2);
        let a = loader.request(write_png(dir.path(), "a.png", 10));
        let b = loader.request(write_png(dir.path(), "b.png", 20));

        let results = loader.wait_all(Duration::from_secs(10));
        let tickets: HashSet<_> = results.iter().map(|r| r.ticket).collect();
        assert_eq!(tickets, HashSet::from([a, b]));
        assert!(results.iter().all(|r| r.result.is_ok()));
        assert_eq!(loader.pending_count(), 0);
    }

    #[test]
    fn test_missing_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ImageLoader::new(1);
        loader.request(dir.path().join("missing.png"));
        let results = loader.wait_all(Duration::from_secs(10));
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].result, Err(ImageError::Io(_))));
    }

    #[test]
    fn test_reset_drops_outstanding_results() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ImageLoader::new(1);
        let path = write_png(dir.path(), "a.png", 10);
        loader.request(path.clone());
        loader.reset();
        assert_eq!(loader.pending_count(), 0);

        let fresh = loader.request(path);
        let results = loader.wait_all(Duration::from_secs(10));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ticket, fresh);
    }

    #[test]
    fn test_discarded_load_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ImageLoader::new(1);
        let ticket = loader.request(write_png(dir.path(), "a.png", 10));
        assert!(loader.discard(ticket));
        assert!(!loader.discard(ticket));
        assert!(loader.wait_all(Duration::from_millis(10)).is_empty());
    }
}
