//! Headless image grid: a fixed set of recycled cells over a list of URLs.
//!
//! Cells are reused page after page, so a load started for one page can
//! finish after its cell shows another URL. The binding rules make sure such
//! a result is dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{Bitmap, CacheKey, TargetSize};
use crate::domain::ports::{ShowView, SinkRef};
use crate::infrastructure::config::BrowseConfig;
use crate::infrastructure::image::{ImageLoader, RequestOutcome, SinkBinding};

/// One grid slot.
#[derive(Default)]
pub struct GridCell {
    url: Mutex<Option<String>>,
    pending: Mutex<Option<CacheKey>>,
    shown: Mutex<Option<Arc<Bitmap>>>,
}

impl GridCell {
    /// URL the cell is bound to.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.url.lock().clone()
    }

    /// Bitmap currently displayed.
    #[must_use]
    pub fn shown(&self) -> Option<Arc<Bitmap>> {
        self.shown.lock().clone()
    }

    /// Returns true if nothing is displayed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shown.lock().is_none()
    }

    fn bind_url(&self, url: Option<&str>) {
        match url {
            Some(url) => {
                SinkBinding::prepare(self, &CacheKey::from_url(url));
                *self.url.lock() = Some(url.to_string());
            }
            None => {
                self.clear_result();
                self.set_pending_key(None);
                *self.url.lock() = None;
            }
        }
    }
}

impl ShowView for GridCell {
    fn pending_key(&self) -> Option<CacheKey> {
        self.pending.lock().clone()
    }

    fn set_pending_key(&self, key: Option<CacheKey>) {
        *self.pending.lock() = key;
    }

    fn apply_result(&self, bitmap: Arc<Bitmap>) {
        *self.shown.lock() = Some(bitmap);
    }

    fn clear_result(&self) {
        *self.shown.lock() = None;
    }
}

impl std::fmt::Display for GridCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.shown() {
            Some(bitmap) => write!(
                f,
                "[{:>4}x{:<4} 1/{} {:<6}]",
                bitmap.width(),
                bitmap.height(),
                bitmap.sample_size(),
                format!("{:?}", bitmap.as_image().color())
            ),
            None if self.url.lock().is_some() => write!(f, "[{:^20}]", "loading"),
            None => write!(f, "[{:^20}]", ""),
        }
    }
}

/// Pages of recycled cells over a URL list.
pub struct Grid {
    urls: Vec<String>,
    cells: Vec<Arc<GridCell>>,
    columns: usize,
    target: TargetSize,
    page: usize,
}

impl Grid {
    /// Creates a grid of `columns * rows` cells over `urls`.
    #[must_use]
    pub fn new(urls: Vec<String>, config: &BrowseConfig) -> Self {
        let cells = (0..config.page_size().max(1))
            .map(|_| Arc::new(GridCell::default()))
            .collect();
        Self {
            urls,
            cells,
            columns: config.columns.max(1),
            target: TargetSize::new(config.req_width, config.req_height),
            page: 0,
        }
    }

    /// Number of pages needed to show every URL.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.urls.len().div_ceil(self.cells.len())
    }

    /// Currently shown page.
    #[must_use]
    pub const fn page(&self) -> usize {
        self.page
    }

    /// Visible cells, in layout order.
    #[must_use]
    pub fn cells(&self) -> &[Arc<GridCell>] {
        &self.cells
    }

    /// Rebinds every cell to the URLs of `page`.
    ///
    /// Cells keep their image if they stay on the same URL.
    pub fn scroll_to(&mut self, page: usize) {
        self.page = page;
        let start = page * self.cells.len();
        for (offset, cell) in self.cells.iter().enumerate() {
            cell.bind_url(self.urls.get(start + offset).map(String::as_str));
        }
        debug!(page, start, "Scrolled grid");
    }

    /// Asks `loader` for every visible cell that shows nothing yet.
    ///
    /// Walks from the last visible cell to the first. Returns how many
    /// requests started a new load.
    pub fn on_idle(&self, loader: &ImageLoader) -> usize {
        let mut started = 0;
        for (index, cell) in self.cells.iter().enumerate().rev() {
            if !cell.is_empty() {
                continue;
            }
            let Some(url) = cell.url() else {
                continue;
            };
            trace!(index, url = %url, "Cell empty, requesting load");
            let sink: SinkRef = cell.clone();
            if loader.request_load(&url, self.target, &sink) == RequestOutcome::Queued {
                started += 1;
            }
        }
        started
    }

    /// Returns true once every bound cell displays an image.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.cells
            .iter()
            .all(|cell| cell.url().is_none() || !cell.is_empty())
    }

    /// Number of cells displaying an image.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.cells.iter().filter(|cell| !cell.is_empty()).count()
    }

    /// Renders the visible page as text, one line per row.
    #[must_use]
    pub fn render(&self) -> String {
        self.cells
            .chunks(self.columns)
            .map(|row| {
                row.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
