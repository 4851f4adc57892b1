use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error};

use crate::common::{PageDbError, PageId, Result, DISK_SCHEDULER_QUEUE_DEPTH, PAGE_SIZE};

use super::DiskManager;

/// Owned page-sized buffer handed between callers and the I/O worker
pub type PageBuf = Box<[u8; PAGE_SIZE]>;

/// A disk I/O request. Buffers travel by value so the worker never touches
/// caller memory.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        reply: Sender<Result<PageBuf>>,
    },
    Write {
        page_id: PageId,
        data: PageBuf,
        reply: Sender<Result<()>>,
    },
}

/// DiskScheduler runs a background worker thread that performs page I/O
/// against the DiskManager, fed by a bounded request queue.
///
/// The `*_sync` helpers block until the worker replies, so callers see
/// ordinary synchronous I/O.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: Option<Sender<DiskRequest>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(DISK_SCHEDULER_QUEUE_DEPTH);

        let dm_clone = Arc::clone(&disk_manager);
        let worker_handle = thread::Builder::new()
            .name("pagedb-disk".to_string())
            .spawn(move || Self::run_worker(dm_clone, receiver))
            .ok();

        if worker_handle.is_none() {
            error!("failed to spawn disk worker thread");
        }

        Self {
            disk_manager,
            request_sender: Some(sender),
            worker_handle,
        }
    }

    /// Queues a request for the worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        let sender = self
            .request_sender
            .as_ref()
            .ok_or_else(|| PageDbError::DiskScheduler("scheduler is shut down".to_string()))?;
        sender
            .send(request)
            .map_err(|e| PageDbError::DiskScheduler(format!("failed to schedule request: {}", e)))
    }

    /// Reads a page and waits for the result.
    pub fn schedule_read_sync(&self, page_id: PageId) -> Result<PageBuf> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Read { page_id, reply: tx })?;
        rx.recv().map_err(|e| {
            PageDbError::DiskScheduler(format!("failed to receive completion: {}", e))
        })?
    }

    /// Writes a page and waits until it is durable.
    pub fn schedule_write_sync(&self, page_id: PageId, data: PageBuf) -> Result<()> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Write {
            page_id,
            data,
            reply: tx,
        })?;
        rx.recv().map_err(|e| {
            PageDbError::DiskScheduler(format!("failed to receive completion: {}", e))
        })?
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Processes requests until every sender is gone. Requests still queued
    /// when the scheduler is dropped are drained first.
    fn run_worker(disk_manager: Arc<DiskManager>, receiver: Receiver<DiskRequest>) {
        for request in receiver.iter() {
            Self::process_request(&disk_manager, request);
        }
        debug!("disk worker exiting");
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read { page_id, reply } => {
                let mut data: PageBuf = Box::new([0u8; PAGE_SIZE]);
                let result = disk_manager.read_page(page_id, &mut data).map(|_| data);
                if let Err(e) = &result {
                    error!("read of {} failed: {}", page_id, e);
                }
                let _ = reply.send(result);
            }
            DiskRequest::Write {
                page_id,
                data,
                reply,
            } => {
                let result = disk_manager.write_page(page_id, &data);
                if let Err(e) = &result {
                    error!("write of {} failed: {}", page_id, e);
                }
                let _ = reply.send(result);
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Closing the queue lets the worker drain and exit.
        self.request_sender.take();

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
