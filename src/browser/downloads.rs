//! Download tracking.
//!
//! Each `Browser.downloadWillBegin` creates a [`Mission`] keyed by the
//! browser's guid; `Browser.downloadProgress` updates it in place. A
//! mission's state only moves forward: once completed or cancelled it never
//! changes again.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use cdp_pilot::{DownloadManager, Session};
//!
//! # async fn example(browser: Session) -> cdp_pilot::Result<()> {
//! let downloads = DownloadManager::new(&browser);
//! downloads.enable("/tmp/downloads").await?;
//!
//! // ... click a download link ...
//!
//! if let Some(mission) = downloads.wait_begin(Duration::from_secs(10)).await? {
//!     mission.wait(Duration::from_secs(60), true).await?;
//!     println!("{:?} {:.0}%", mission.final_path(), mission.rate());
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::browser::wait::poll_until;
use crate::error::{Error, Result};
use crate::identifiers::HandlerId;
use crate::protocol::{BrowserCommand, Command, DownloadState, Event, ParsedEvent};
use crate::session::{Session, WeakSession};

const BEGIN_EVENTS: [&str; 2] = ["Browser.downloadWillBegin", "Page.downloadWillBegin"];
const PROGRESS_EVENTS: [&str; 2] = ["Browser.downloadProgress", "Page.downloadProgress"];

// ============================================================================
// Mission
// ============================================================================

#[derive(Debug)]
struct MissionData {
    guid: String,
    url: String,
    folder: Option<PathBuf>,
    suggested_filename: String,
    state: DownloadState,
    total_bytes: u64,
    received_bytes: u64,
    file_path: Option<PathBuf>,
}

/// One tracked download.
///
/// Cheap to clone; clones observe the same progress.
#[derive(Clone)]
pub struct Mission {
    data: Arc<Mutex<MissionData>>,
    session: WeakSession,
    poll_interval: Duration,
}

impl fmt::Debug for Mission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.lock();
        f.debug_struct("Mission")
            .field("guid", &data.guid)
            .field("state", &data.state)
            .field("received_bytes", &data.received_bytes)
            .field("total_bytes", &data.total_bytes)
            .finish_non_exhaustive()
    }
}

impl Mission {
    fn new(data: MissionData, session: WeakSession, poll_interval: Duration) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            session,
            poll_interval,
        }
    }

    /// Applies a progress report. Terminal missions ignore it.
    fn update(
        &self,
        total_bytes: u64,
        received_bytes: u64,
        state: DownloadState,
        file_path: Option<String>,
    ) {
        let mut data = self.data.lock();
        if data.state.is_terminal() {
            return;
        }

        data.total_bytes = total_bytes;
        data.received_bytes = received_bytes;
        data.state = state;
        if let Some(path) = file_path.filter(|p| !p.is_empty()) {
            data.file_path = Some(PathBuf::from(path));
        }
    }

    /// Browser-issued guid.
    #[must_use]
    pub fn guid(&self) -> String {
        self.data.lock().guid.clone()
    }

    /// Download URL.
    #[must_use]
    pub fn url(&self) -> String {
        self.data.lock().url.clone()
    }

    /// Folder downloads were routed to when this one began.
    #[must_use]
    pub fn folder(&self) -> Option<PathBuf> {
        self.data.lock().folder.clone()
    }

    /// Name suggested by the server.
    #[must_use]
    pub fn suggested_filename(&self) -> String {
        self.data.lock().suggested_filename.clone()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DownloadState {
        self.data.lock().state
    }

    /// Total bytes expected, `0` when unknown.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.data.lock().total_bytes
    }

    /// Bytes received so far.
    #[must_use]
    pub fn received_bytes(&self) -> u64 {
        self.data.lock().received_bytes
    }

    /// Percentage received, `0.0` while the total is unknown.
    #[must_use]
    pub fn rate(&self) -> f64 {
        let data = self.data.lock();
        if data.total_bytes == 0 {
            return 0.0;
        }
        data.received_bytes as f64 / data.total_bytes as f64 * 100.0
    }

    /// Returns `true` once completed or cancelled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.data.lock().state.is_terminal()
    }

    /// Where the file lives.
    ///
    /// The browser-reported path when known, otherwise `folder/guid`
    /// (downloads are saved under their guid).
    #[must_use]
    pub fn final_path(&self) -> Option<PathBuf> {
        let data = self.data.lock();
        data.file_path
            .clone()
            .or_else(|| data.folder.as_ref().map(|folder| folder.join(&data.guid)))
    }

    /// Waits for a terminal state.
    ///
    /// Returns `false` on timeout, after cancelling the download when
    /// `cancel_if_timeout` is set.
    ///
    /// # Errors
    ///
    /// Propagates the cancel failure.
    pub async fn wait(&self, timeout: Duration, cancel_if_timeout: bool) -> Result<bool> {
        let done = poll_until(self.poll_interval, timeout, || {
            let ready = self.is_done().then_some(());
            async move { Ok(ready) }
        })
        .await?
        .is_some();

        if !done && cancel_if_timeout {
            self.cancel().await?;
        }
        Ok(done)
    }

    /// Cancels the download.
    ///
    /// The state flips to cancelled when the browser confirms.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the session is gone.
    pub async fn cancel(&self) -> Result<()> {
        let session = self.session.upgrade().ok_or(Error::ConnectionClosed)?;
        let guid = self.guid();

        debug!(%guid, "Cancelling download");
        session
            .send_command(Command::Browser(BrowserCommand::CancelDownload { guid }))
            .await?;
        Ok(())
    }
}

// ============================================================================
// DownloadManager
// ============================================================================

#[derive(Default)]
struct Ledger {
    folder: Option<PathBuf>,
    missions: FxHashMap<String, Mission>,
    /// Guids in begin order.
    order: Vec<String>,
    waiters: VecDeque<oneshot::Sender<Mission>>,
}

struct DownloadInner {
    session: Session,
    ledger: Arc<Mutex<Ledger>>,
    handlers: Mutex<Vec<(&'static str, HandlerId)>>,
}

impl Drop for DownloadInner {
    fn drop(&mut self) {
        for (event, id) in self.handlers.get_mut().drain(..) {
            self.session.off(event, id);
        }
    }
}

/// Tracks downloads started anywhere in the browser.
///
/// Download events are browser-wide, so the manager always listens on the
/// root session.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<DownloadInner>,
}

impl fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ledger = self.inner.ledger.lock();
        f.debug_struct("DownloadManager")
            .field("folder", &ledger.folder)
            .field("missions", &ledger.order.len())
            .finish_non_exhaustive()
    }
}

impl DownloadManager {
    /// Creates a manager; nothing is sent until [`enable`](Self::enable).
    #[must_use]
    pub fn new(session: &Session) -> Self {
        Self {
            inner: Arc::new(DownloadInner {
                session: session.root(),
                ledger: Arc::new(Mutex::new(Ledger::default())),
                handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Routes downloads into `folder` and starts tracking them.
    ///
    /// The folder is created if missing.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the folder cannot be created
    /// - the `Browser.setDownloadBehavior` failure
    pub async fn enable(&self, folder: impl AsRef<Path>) -> Result<()> {
        let folder = std::path::absolute(folder.as_ref())?;
        tokio::fs::create_dir_all(&folder).await?;

        self.register();
        self.inner.ledger.lock().folder = Some(folder.clone());

        self.inner
            .session
            .send_command(Command::Browser(BrowserCommand::SetDownloadBehavior {
                behavior: "allowAndName".to_string(),
                download_path: Some(folder.to_string_lossy().into_owned()),
                events_enabled: true,
            }))
            .await?;

        info!(folder = %folder.display(), "Downloads enabled");
        Ok(())
    }

    /// Restores the browser's default download handling and stops tracking.
    ///
    /// Known missions stay queryable.
    ///
    /// # Errors
    ///
    /// Propagates the `Browser.setDownloadBehavior` failure.
    pub async fn disable(&self) -> Result<()> {
        self.unregister();
        self.inner.ledger.lock().folder = None;

        self.inner
            .session
            .send_command(Command::Browser(BrowserCommand::SetDownloadBehavior {
                behavior: "default".to_string(),
                download_path: None,
                events_enabled: false,
            }))
            .await?;
        Ok(())
    }

    /// All missions, in begin order.
    #[must_use]
    pub fn missions(&self) -> Vec<Mission> {
        let ledger = self.inner.ledger.lock();
        ledger
            .order
            .iter()
            .filter_map(|guid| ledger.missions.get(guid).cloned())
            .collect()
    }

    /// Looks up a mission by guid.
    #[must_use]
    pub fn get(&self, guid: &str) -> Option<Mission> {
        self.inner.ledger.lock().missions.get(guid).cloned()
    }

    /// Waits for the next download to begin.
    ///
    /// Waiters are served first come, first served; each begin satisfies
    /// exactly one. Returns `None` on timeout.
    pub async fn wait_begin(&self, timeout: Duration) -> Result<Option<Mission>> {
        let (tx, mut rx) = oneshot::channel();
        self.inner.ledger.lock().waiters.push_back(tx);

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(mission)) => Ok(Some(mission)),
            Ok(Err(_)) => Ok(None),
            Err(_) => {
                // Under the ledger lock no begin can race the close.
                let mut ledger = self.inner.ledger.lock();
                rx.close();
                ledger.waiters.retain(|waiter| !waiter.is_closed());
                Ok(rx.try_recv().ok())
            }
        }
    }

    /// Number of callers currently blocked in [`DownloadManager::wait_begin`].
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.inner.ledger.lock().waiters.len()
    }

    fn register(&self) {
        let mut handlers = self.inner.handlers.lock();
        if !handlers.is_empty() {
            return;
        }

        let session = &self.inner.session;
        let poll_interval = session.options().poll_interval;

        for event in BEGIN_EVENTS {
            let ledger = Arc::clone(&self.inner.ledger);
            let weak = session.downgrade();
            let id = session.on(event, move |message: &Event| {
                on_begin(&ledger, message, &weak, poll_interval);
            });
            handlers.push((event, id));
        }

        for event in PROGRESS_EVENTS {
            let ledger = Arc::clone(&self.inner.ledger);
            let id = session.on(event, move |message: &Event| {
                on_progress(&ledger, message);
            });
            handlers.push((event, id));
        }
    }

    fn unregister(&self) {
        let handlers: Vec<_> = self.inner.handlers.lock().drain(..).collect();
        for (event, id) in handlers {
            self.inner.session.off(event, id);
        }
    }
}

// ============================================================================
// Event Handlers
// ============================================================================

fn on_begin(ledger: &Mutex<Ledger>, event: &Event, session: &WeakSession, poll_interval: Duration) {
    let ParsedEvent::DownloadWillBegin {
        guid,
        url,
        suggested_filename,
        ..
    } = event.parse()
    else {
        return;
    };

    let mut ledger = ledger.lock();
    if ledger.missions.contains_key(&guid) {
        return;
    }

    debug!(%guid, %url, "Download began");
    let mission = Mission::new(
        MissionData {
            guid: guid.clone(),
            url,
            folder: ledger.folder.clone(),
            suggested_filename,
            state: DownloadState::InProgress,
            total_bytes: 0,
            received_bytes: 0,
            file_path: None,
        },
        session.clone(),
        poll_interval,
    );

    ledger.missions.insert(guid.clone(), mission.clone());
    ledger.order.push(guid);

    // Waiters that gave up are skipped.
    while let Some(waiter) = ledger.waiters.pop_front() {
        if waiter.send(mission.clone()).is_ok() {
            break;
        }
    }
}

fn on_progress(ledger: &Mutex<Ledger>, event: &Event) {
    let ParsedEvent::DownloadProgress {
        guid,
        total_bytes,
        received_bytes,
        state,
        file_path,
    } = event.parse()
    else {
        return;
    };

    let mission = ledger.lock().missions.get(&guid).cloned();
    if let Some(mission) = mission {
        mission.update(total_bytes, received_bytes, state, file_path);
        if state.is_terminal() {
            debug!(%guid, ?state, "Download finished");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
