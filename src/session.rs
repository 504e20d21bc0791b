//! The profile session: configuration, loading, the pass entry point, and
//! teardown.
//!
//! A session is built once per compilation unit, right after flag
//! validation, and consulted read-only by every function's annotation pass.
//! The loaded file bytes are owned by a [`SampleData`] value that must
//! outlive the session; the index borrows its strings from that buffer.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::annotate;
use crate::cfg::Function;
use crate::dump;
use crate::error::{Error, ErrorSink};
use crate::index::SampleIndex;
use crate::reader::read_samples;

/// File name used when no override is configured.
pub const DEFAULT_SAMPLE_DATA_NAME: &str = "sp.data";

/// Sample-profiling configuration, mirroring the driver's flags.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    sample_profile: bool,
    branch_probabilities: bool,
    data_name: Option<PathBuf>,
    profile_dump: bool,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates the sample-profile pass.
    pub fn sample_profile(mut self, on: bool) -> Self {
        self.sample_profile = on;
        self
    }

    /// Declares that an instrumented edge profile is in use. Mutually
    /// exclusive with sample profiling; takes precedence over it.
    pub fn branch_probabilities(mut self, on: bool) -> Self {
        self.branch_probabilities = on;
        self
    }

    /// Overrides the sample file path.
    pub fn data_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_name = Some(path.into());
        self
    }

    /// Enables the CFG profile dumper.
    pub fn profile_dump(mut self, on: bool) -> Self {
        self.profile_dump = on;
        self
    }

    /// The sample file path, defaulting to [`DEFAULT_SAMPLE_DATA_NAME`].
    pub fn data_path(&self) -> &Path {
        self.data_name
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_SAMPLE_DATA_NAME))
    }
}

/// The raw bytes of a loaded sample file.
#[derive(Debug)]
pub struct SampleData {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl SampleData {
    /// Reads the whole file in one piece.
    pub fn load(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let bytes = std::fs::read(&path)?;
        Ok(Self { path, bytes })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Process-wide sample-profile state for one compilation unit.
pub struct ProfileSession<'data> {
    index: Option<SampleIndex<'data>>,
    num_samples: u64,
    enabled: bool,
    profile_dump: bool,
    /// Profile summary of adopted profiles: number of profiled runs and the
    /// maximum count seen in the sample file.
    runs: u32,
    sum_max: i64,
}

impl<'data> ProfileSession<'data> {
    /// Validates the flag combination and builds the index.
    ///
    /// `data` is `None` when the sample file could not be opened. Sample
    /// profiling ends up disabled when the flags conflict, when the file is
    /// missing, or when it contains no usable records; each case raises its
    /// diagnostic through `sink` and the session stays inert.
    pub fn init<E>(data: Option<&'data SampleData>, options: &SessionOptions, sink: &mut E) -> Self
    where
        E: ErrorSink<Error>,
    {
        let mut session = Self {
            index: None,
            num_samples: 0,
            enabled: false,
            profile_dump: options.profile_dump,
            runs: 0,
            sum_max: 0,
        };

        if !options.sample_profile {
            return session;
        }
        if options.branch_probabilities {
            sink.raise_error(Error::FlagConflict);
            return session;
        }

        let data = match data {
            Some(data) => data,
            None => {
                sink.raise_error(Error::NoData {
                    path: options.data_path().display().to_string(),
                });
                return session;
            }
        };

        let (index, num_samples) = read_samples(data.bytes(), sink);
        if num_samples == 0 {
            sink.raise_error(Error::NoData {
                path: data.path().display().to_string(),
            });
            return session;
        }

        session.index = Some(index);
        session.num_samples = num_samples;
        session.enabled = true;
        session
    }

    /// Whether sample profiling survived initialization.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of per-line records loaded from the file.
    pub fn num_samples(&self) -> u64 {
        self.num_samples
    }

    pub fn index(&self) -> Option<&SampleIndex<'data>> {
        self.index.as_ref()
    }

    /// Maximum sample count in the file; 0 before a successful load.
    pub fn max_count(&self) -> i64 {
        self.index.as_ref().map_or(0, |index| index.max_count())
    }

    /// Number of profiled runs recorded for adopted profiles.
    pub fn runs(&self) -> u32 {
        self.runs
    }

    /// Summary maximum for adopted profiles.
    pub fn sum_max(&self) -> i64 {
        self.sum_max
    }

    /// The sample-profile pass entry for one function.
    ///
    /// Runs the static probability estimator if nobody has yet, annotates
    /// the CFG, and marks the function so a second invocation is a no-op.
    pub fn run_pass(&mut self, func: &mut Function, dump: Option<&mut dyn Write>) {
        if !self.enabled || func.after_profile {
            return;
        }
        let index = match &self.index {
            Some(index) => index,
            None => return,
        };

        if !func.probabilities_estimated {
            func.estimate_probabilities();
        }

        let summary = annotate::annotate_function(func, index, dump);
        let max_count = index.max_count();
        if summary.adopted {
            self.runs = 1;
            self.sum_max = max_count;
        }
        func.after_profile = true;
    }

    /// Appends the function's CFG profile to `out` when dumping is enabled.
    pub fn dump_profile<W: Write>(&self, func: &Function, out: &mut W) -> std::io::Result<()> {
        if !self.profile_dump {
            return Ok(());
        }
        dump::write_cfg_profile(func, out)
    }

    /// Appends the function's CFG profile to [`dump::PROF_COMPARE_SAMPLE`].
    pub fn dump_profile_file(&self, func: &Function) -> std::io::Result<()> {
        if !self.profile_dump {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(dump::PROF_COMPARE_SAMPLE)?;
        dump::write_cfg_profile(func, &mut file)
    }

    /// Releases the index. Safe to call more than once; [`Drop`] also runs
    /// it.
    pub fn end(&mut self) {
        self.index = None;
        self.enabled = false;
    }
}

impl Drop for ProfileSession<'_> {
    fn drop(&mut self) {
        self.end();
    }
}
