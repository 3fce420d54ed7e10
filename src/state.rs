use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::task;
use tracing::{debug, info, warn};

use crate::error::{SheetError, SheetResult};
use crate::mapping::{MappingProfile, Role};
use crate::model::Sheet;
use crate::sheet::{LoadOptions, SheetConfig, SheetValidation};
use crate::submission::{SheetSubmission, build_plan};
use crate::workbook::{AutoDecoder, WorkbookDecoder};

pub const DEFAULT_MAX_FILE_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub load: LoadOptions,
    pub profile: MappingProfile,
    pub max_file_bytes: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            load: LoadOptions::default(),
            profile: MappingProfile::default(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

/// Proof that a decode was started at a given generation. Results are only
/// applied while the generation is still current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeTicket {
    generation: u64,
    source_name: String,
}

impl DecodeTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecodeOutcome {
    Applied { sheet_count: usize },
    /// A later upload or a reset happened while this decode was running.
    Superseded,
}

#[derive(Debug, Default)]
struct SessionData {
    source_name: Option<String>,
    configs: Vec<SheetConfig>,
    active_sheet_index: usize,
}

/// Read-only copy of the session handed to renderers and the submission
/// collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub source_name: Option<String>,
    pub configs: Vec<SheetConfig>,
    pub active_sheet_index: usize,
    pub generation: u64,
    pub is_processing: bool,
}

impl SessionSnapshot {
    pub fn active_config(&self) -> Option<&SheetConfig> {
        self.configs.get(self.active_sheet_index)
    }
}

/// Clears the processing flag when a `process_bytes` future is dropped before
/// its decode result was applied. No-op once a newer upload or reset ran.
struct PendingDecode<'a> {
    session: &'a WorkbookSession,
    generation: u64,
}

impl Drop for PendingDecode<'_> {
    fn drop(&mut self) {
        let _data = self.session.data.write();
        if self.session.generation.load(Ordering::SeqCst) == self.generation
            && self.session.processing.swap(false, Ordering::SeqCst)
        {
            debug!(generation = self.generation, "decode abandoned before completion");
        }
    }
}

/// Owns the active workbook and every per-sheet configuration derived from it.
pub struct WorkbookSession {
    options: SessionOptions,
    decoder: Arc<dyn WorkbookDecoder>,
    /// Bumped by every upload and reset
    generation: AtomicU64,
    processing: AtomicBool,
    data: RwLock<SessionData>,
}

impl WorkbookSession {
    pub fn new(options: SessionOptions) -> Self {
        Self::with_decoder(options, Arc::new(AutoDecoder))
    }

    pub fn with_decoder(options: SessionOptions, decoder: Arc<dyn WorkbookDecoder>) -> Self {
        Self {
            options,
            decoder,
            generation: AtomicU64::new(0),
            processing: AtomicBool::new(false),
            data: RwLock::new(SessionData::default()),
        }
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    // =========================================================================
    // DECODE LIFECYCLE
    // =========================================================================

    /// Starts a new upload. Any decode still in flight is superseded. Files
    /// over the size limit are refused and leave the session untouched.
    pub fn begin_decode(&self, source_name: impl Into<String>, size: usize) -> SheetResult<DecodeTicket> {
        let source_name = source_name.into();
        if size > self.options.max_file_bytes {
            warn!(source = %source_name, size, limit = self.options.max_file_bytes, "upload rejected");
            return Err(SheetError::FileTooLarge {
                bytes: size,
                limit: self.options.max_file_bytes,
            });
        }

        let _guard = self.data.write();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.processing.store(true, Ordering::SeqCst);
        debug!(source = %source_name, generation, size, "decode started");
        Ok(DecodeTicket {
            generation,
            source_name,
        })
    }

    /// Applies a decode result if its ticket is still current, otherwise drops
    /// it. A current failure clears the session so no stale sheets remain.
    pub fn complete_decode(
        &self,
        ticket: DecodeTicket,
        result: SheetResult<Vec<Sheet>>,
    ) -> SheetResult<DecodeOutcome> {
        let mut data = self.data.write();
        if ticket.generation != self.generation.load(Ordering::SeqCst) {
            debug!(
                source = %ticket.source_name,
                generation = ticket.generation,
                "discarding superseded decode"
            );
            return Ok(DecodeOutcome::Superseded);
        }
        self.processing.store(false, Ordering::SeqCst);

        match result {
            Ok(sheets) => {
                let configs: Vec<SheetConfig> = sheets
                    .iter()
                    .enumerate()
                    .map(|(idx, sheet)| SheetConfig::from_sheet(sheet, idx, self.options.load))
                    .collect();
                let sheet_count = configs.len();
                *data = SessionData {
                    source_name: Some(ticket.source_name),
                    configs,
                    active_sheet_index: 0,
                };
                info!(
                    source = data.source_name.as_deref().unwrap_or_default(),
                    sheet_count, "workbook loaded"
                );
                Ok(DecodeOutcome::Applied { sheet_count })
            }
            Err(err) => {
                *data = SessionData::default();
                warn!(source = %ticket.source_name, error = %err, "workbook decode failed");
                Err(err)
            }
        }
    }

    /// Decodes `bytes` on the blocking pool and applies the result unless a
    /// newer upload or a reset happened meanwhile.
    pub async fn process_bytes(
        &self,
        source_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> SheetResult<DecodeOutcome> {
        let ticket = self.begin_decode(source_name, bytes.len())?;
        let _pending = PendingDecode {
            session: self,
            generation: ticket.generation,
        };
        let decoder = Arc::clone(&self.decoder);
        let result = task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|e| SheetError::DecodeTask(e.to_string()))
            .and_then(|decoded| decoded);
        self.complete_decode(ticket, result)
    }

    /// Returns to the empty state. Safe during a pending decode; its result
    /// will be discarded.
    pub fn reset(&self) {
        let mut data = self.data.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.processing.store(false, Ordering::SeqCst);
        *data = SessionData::default();
        debug!("session reset");
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn snapshot(&self) -> SessionSnapshot {
        let data = self.data.read();
        SessionSnapshot {
            source_name: data.source_name.clone(),
            configs: data.configs.clone(),
            active_sheet_index: data.active_sheet_index,
            generation: self.generation(),
            is_processing: self.is_processing(),
        }
    }

    pub fn configs(&self) -> Vec<SheetConfig> {
        self.data.read().configs.clone()
    }

    pub fn config(&self, sheet_index: usize) -> SheetResult<SheetConfig> {
        let data = self.data.read();
        data.configs
            .get(sheet_index)
            .cloned()
            .ok_or(SheetError::SheetIndexOutOfRange {
                index: sheet_index,
                sheet_count: data.configs.len(),
            })
    }

    pub fn sheet_count(&self) -> usize {
        self.data.read().configs.len()
    }

    pub fn active_sheet_index(&self) -> usize {
        self.data.read().active_sheet_index
    }

    pub fn validations(&self) -> Vec<SheetValidation> {
        self.data
            .read()
            .configs
            .iter()
            .enumerate()
            .map(|(idx, config)| config.validate(idx, self.options.profile))
            .collect()
    }

    pub fn submission_plan(&self) -> SheetResult<Vec<SheetSubmission>> {
        build_plan(&self.data.read().configs, self.options.profile)
    }

    // =========================================================================
    // EDITS
    // =========================================================================

    pub fn set_active_sheet(&self, sheet_index: usize) -> SheetResult<()> {
        let mut data = self.data.write();
        if sheet_index >= data.configs.len() {
            return Err(SheetError::SheetIndexOutOfRange {
                index: sheet_index,
                sheet_count: data.configs.len(),
            });
        }
        data.active_sheet_index = sheet_index;
        Ok(())
    }

    pub fn set_mapping(&self, sheet_index: usize, role: Role, column: usize) -> SheetResult<()> {
        self.replace_config(sheet_index, |config| config.with_mapping(role, column))
    }

    pub fn clear_role(&self, sheet_index: usize, role: Role) -> SheetResult<()> {
        self.replace_config(sheet_index, |config| Ok(config.with_role_cleared(role)))
    }

    pub fn clear_column(&self, sheet_index: usize, column: usize) -> SheetResult<()> {
        self.replace_config(sheet_index, |config| Ok(config.with_column_cleared(column)))
    }

    pub fn set_manual_brand(&self, sheet_index: usize, value: &str) -> SheetResult<()> {
        self.replace_config(sheet_index, |config| config.with_manual_value(value))
    }

    pub fn clear_manual_brand(&self, sheet_index: usize) -> SheetResult<()> {
        self.replace_config(sheet_index, |config| Ok(config.without_manual_value()))
    }

    pub fn set_header_index(&self, sheet_index: usize, header_index: usize) -> SheetResult<()> {
        let auto_map = self.options.load.auto_map;
        self.replace_config(sheet_index, |config| {
            config.with_header_index(header_index, auto_map)
        })
    }

    pub fn set_selected(&self, sheet_index: usize, is_selected: bool) -> SheetResult<()> {
        self.replace_config(sheet_index, |config| Ok(config.with_selection(is_selected)))
    }

    pub fn toggle_selection(&self, sheet_index: usize) -> SheetResult<()> {
        self.replace_config(sheet_index, |config| Ok(config.with_selection(!config.is_selected)))
    }

    /// Swaps one config for a derived copy. A failed transform leaves the
    /// stored config untouched.
    fn replace_config<F>(&self, sheet_index: usize, transform: F) -> SheetResult<()>
    where
        F: FnOnce(&SheetConfig) -> SheetResult<SheetConfig>,
    {
        let mut data = self.data.write();
        let sheet_count = data.configs.len();
        let slot = data
            .configs
            .get_mut(sheet_index)
            .ok_or(SheetError::SheetIndexOutOfRange {
                index: sheet_index,
                sheet_count,
            })?;
        *slot = transform(&*slot)?;
        Ok(())
    }
}
