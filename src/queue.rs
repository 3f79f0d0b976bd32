// 🚦 Write-Serialization Queue - one writer, many callers
//
// SQLite allows a single writer. Every mutation is therefore funnelled through
// a bounded tokio mpsc inbox into ONE dedicated OS thread that owns the
// connection, the account arena and the book. Callers get their result back on
// a per-request oneshot channel.
//
// Per request the worker:
// 1. Skips it if the caller already went away
// 2. Answers Timeout (without touching storage) if its deadline has passed
// 3. Otherwise runs it inside one BEGIN IMMEDIATE transaction:
//    commit on Ok, full rollback (SQL + staged accounts) on Err or panic

use crate::db;
use crate::entities::account::AccountTree;
use crate::entities::book::Book;
use crate::entities::commodity::Commodity;
use crate::error::{LedgerError, LedgerResult};
use crate::resolver::AccountResolver;
use crate::schema;
use rusqlite::{Connection, TransactionBehavior};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

pub const WORKER_THREAD_NAME: &str = "ledger-writer";

// ============================================================================
// LEDGER STORE (owned by the worker)
// ============================================================================

/// Connection plus the in-memory state that must stay in step with it
pub struct LedgerStore {
    conn: Connection,
    accounts: AccountTree,
    book: Book,
}

impl LedgerStore {
    /// Open the ledger file, bootstrapping a new book if it has none
    pub fn open(path: &Path, default_currency: &str) -> LedgerResult<Self> {
        let conn = db::open_ledger(path)?;
        Self::from_connection(conn, default_currency)
    }

    pub fn open_in_memory(default_currency: &str) -> LedgerResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, default_currency)
    }

    fn from_connection(mut conn: Connection, default_currency: &str) -> LedgerResult<Self> {
        let book = schema::bootstrap(&mut conn, default_currency)?;
        let accounts = db::load_account_tree(&conn, &book)?;

        Ok(LedgerStore {
            conn,
            accounts,
            book,
        })
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn accounts(&self) -> &AccountTree {
        &self.accounts
    }

    pub fn commodities(&self) -> LedgerResult<Vec<Commodity>> {
        db::load_commodities(&self.conn)
    }

    /// Run `op` as one atomic write
    pub fn run_atomic<T, F>(&mut self, op: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut WriteContext<'_>) -> LedgerResult<T>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut ctx = WriteContext {
            conn: &tx,
            accounts: &mut self.accounts,
            book: &self.book,
        };

        match op(&mut ctx) {
            Ok(value) => match tx.commit() {
                Ok(()) => {
                    self.accounts.commit_staged();
                    Ok(value)
                }
                Err(e) => {
                    self.accounts.rollback_staged();
                    Err(e.into())
                }
            },
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                let dropped = self.accounts.rollback_staged();
                if dropped > 0 {
                    debug!(accounts = dropped, "discarded accounts staged by failed write");
                }
                Err(e)
            }
        }
    }

    /// Forget staged accounts after a panic unwound through `run_atomic`
    fn discard_staged(&mut self) -> usize {
        self.accounts.rollback_staged()
    }
}

/// What a write operation may touch while its SQL transaction is open
pub struct WriteContext<'a> {
    conn: &'a Connection,
    accounts: &'a mut AccountTree,
    book: &'a Book,
}

impl<'a> WriteContext<'a> {
    /// The open transaction (derefs from rusqlite::Transaction)
    pub fn conn(&self) -> &Connection {
        self.conn
    }

    pub fn book(&self) -> &Book {
        self.book
    }

    pub fn accounts(&self) -> &AccountTree {
        self.accounts
    }

    pub fn resolver(&mut self) -> AccountResolver<'_> {
        AccountResolver::new(&mut *self.accounts, self.conn)
    }
}

// ============================================================================
// REQUESTS
// ============================================================================

trait Job: Send {
    /// The caller dropped its ticket; nobody is waiting for the answer
    fn is_abandoned(&self) -> bool;

    fn expire(self: Box<Self>);

    fn run(self: Box<Self>, id: u64, store: &mut LedgerStore);
}

struct Pending<T, F> {
    op: F,
    reply: oneshot::Sender<LedgerResult<T>>,
}

impl<T, F> Job for Pending<T, F>
where
    T: Send + 'static,
    F: FnOnce(&mut WriteContext<'_>) -> LedgerResult<T> + Send + 'static,
{
    fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }

    fn expire(self: Box<Self>) {
        let _ = self.reply.send(Err(LedgerError::Timeout));
    }

    fn run(self: Box<Self>, id: u64, store: &mut LedgerStore) {
        let Pending { op, reply } = *self;

        let result = match catch_unwind(AssertUnwindSafe(|| store.run_atomic(op))) {
            Ok(result) => result,
            Err(panic) => {
                store.discard_staged();
                let message = panic_message(panic.as_ref());
                error!(request = id, panic = %message, "write request panicked, rolled back");
                Err(LedgerError::Internal(format!("write request panicked: {}", message)))
            }
        };

        match &result {
            Ok(_) => debug!(request = id, "write request committed"),
            Err(e @ LedgerError::DenominatorMismatch { .. }) => {
                error!(request = id, error = %e, "write request violated amount invariant")
            }
            Err(e) => warn!(request = id, code = e.code(), error = %e, "write request rolled back"),
        }

        // Receiver may be gone (deadline hit mid-write); the write still stands
        let _ = reply.send(result);
    }
}

struct WriteRequest {
    id: u64,
    deadline: Option<std::time::Instant>,
    job: Box<dyn Job>,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================================
// QUEUE + WORKER
// ============================================================================

/// Cloneable handle used by every caller to submit writes
#[derive(Clone)]
pub struct WriteQueue {
    inbox: mpsc::Sender<WriteRequest>,
    next_id: Arc<AtomicU64>,
}

pub struct WorkerHandle {
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Block until the worker drained its inbox and exited
    ///
    /// The worker stops once every WriteQueue clone has been dropped.
    pub fn join(self) -> LedgerResult<()> {
        self.thread
            .join()
            .map_err(|_| LedgerError::Internal("write worker thread panicked".to_string()))
    }
}

impl WriteQueue {
    /// Move `store` onto the worker thread and return the submission handle
    pub fn start(store: LedgerStore, capacity: usize) -> LedgerResult<(WriteQueue, WorkerHandle)> {
        let (inbox, requests) = mpsc::channel(capacity.max(1));

        let thread = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(store, requests))?;

        Ok((
            WriteQueue {
                inbox,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            WorkerHandle { thread },
        ))
    }

    /// Place `op` in the inbox and return a ticket for its result
    ///
    /// Waits for inbox capacity; with a deadline, gives up with Timeout.
    pub async fn enqueue<T, F>(&self, deadline: Option<Instant>, op: F) -> LedgerResult<WriteTicket<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut WriteContext<'_>) -> LedgerResult<T> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, receiver) = oneshot::channel();

        let request = WriteRequest {
            id,
            deadline: deadline.map(Instant::into_std),
            job: Box::new(Pending { op, reply }),
        };

        let sent = match deadline {
            Some(deadline) => timeout_at(deadline, self.inbox.send(request))
                .await
                .map_err(|_| LedgerError::Timeout)?,
            None => self.inbox.send(request).await,
        };
        sent.map_err(|_| LedgerError::QueueClosed)?;

        Ok(WriteTicket {
            id,
            deadline,
            receiver,
        })
    }

    pub async fn submit<T, F>(&self, deadline: Option<Instant>, op: F) -> LedgerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut WriteContext<'_>) -> LedgerResult<T> + Send + 'static,
    {
        self.enqueue(deadline, op).await?.wait().await
    }
}

/// Claim on the result of one enqueued write
pub struct WriteTicket<T> {
    id: u64,
    deadline: Option<Instant>,
    receiver: oneshot::Receiver<LedgerResult<T>>,
}

impl<T> WriteTicket<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn wait(self) -> LedgerResult<T> {
        let outcome = match self.deadline {
            Some(deadline) => timeout_at(deadline, self.receiver)
                .await
                .map_err(|_| LedgerError::Timeout)?,
            None => self.receiver.await,
        };

        outcome.map_err(|_| LedgerError::QueueClosed)?
    }
}

fn run_worker(mut store: LedgerStore, mut requests: mpsc::Receiver<WriteRequest>) {
    info!(book = %store.book().guid, "write worker started");

    let mut handled: u64 = 0;
    while let Some(request) = requests.blocking_recv() {
        let WriteRequest { id, deadline, job } = request;

        if job.is_abandoned() {
            debug!(request = id, "caller went away, skipping write");
            continue;
        }

        if deadline.is_some_and(|d| std::time::Instant::now() >= d) {
            debug!(request = id, "deadline passed while queued, skipping write");
            job.expire();
            continue;
        }

        job.run(id, &mut store);
        handled += 1;
    }

    info!(handled, "write worker stopped");
}
