//! Case export after every converged load flow.

use crate::context::RunningContext;
use crate::observer::SimulatorObserver;
use gat_core::{GatResult, LimitViolation, Network, NetworkSnapshot};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Serializes a network state to a byte sink.
pub trait CaseWriter: Send {
    /// File extension naming the format, e.g. `json`.
    fn format(&self) -> &str;

    fn write(&self, network: &Network, out: &mut dyn Write) -> GatResult<()>;
}

/// Writes the [`NetworkSnapshot`] of the working variant as pretty JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCaseWriter;

impl CaseWriter for JsonCaseWriter {
    fn format(&self) -> &str {
        "json"
    }

    fn write(&self, network: &Network, out: &mut dyn Write) -> GatResult<()> {
        serde_json::to_writer_pretty(out, &NetworkSnapshot::capture(network))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaseCompression {
    #[default]
    None,
    Zstd {
        level: i32,
    },
}

impl CaseCompression {
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            CaseCompression::None => None,
            CaseCompression::Zstd { .. } => Some("zst"),
        }
    }
}

/// `<basename>-<contingency|N>-R<round>.<format>[.<ext>]`
pub fn case_file_name(
    basename: &str,
    contingency_id: Option<&str>,
    round: usize,
    format: &str,
    extension: Option<&str>,
) -> String {
    let mut name = format!(
        "{basename}-{}-R{round}.{format}",
        contingency_id.unwrap_or("N")
    );
    if let Some(ext) = extension {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// Dumps the scenario network every time a load flow converges.
pub struct CaseExporter {
    folder: PathBuf,
    basename: String,
    writer: Box<dyn CaseWriter>,
    compression: CaseCompression,
}

impl CaseExporter {
    pub fn new(folder: impl Into<PathBuf>, basename: impl Into<String>, writer: Box<dyn CaseWriter>) -> Self {
        Self {
            folder: folder.into(),
            basename: basename.into(),
            writer,
            compression: CaseCompression::None,
        }
    }

    pub fn with_compression(mut self, compression: CaseCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn export(&self, ctx: &RunningContext<'_>) -> GatResult<PathBuf> {
        let name = case_file_name(
            &self.basename,
            ctx.contingency_id(),
            ctx.round(),
            self.writer.format(),
            self.compression.extension(),
        );
        let path = self.folder.join(name);
        std::fs::create_dir_all(&self.folder)?;
        let file = BufWriter::new(File::create(&path)?);
        match self.compression {
            CaseCompression::None => {
                let mut file = file;
                self.writer.write(ctx.network(), &mut file)?;
                file.flush()?;
            }
            CaseCompression::Zstd { level } => {
                let mut encoder = zstd::stream::write::Encoder::new(file, level)?;
                self.writer.write(ctx.network(), &mut encoder)?;
                encoder.finish()?.flush()?;
            }
        }
        Ok(path)
    }
}

impl SimulatorObserver for CaseExporter {
    fn name(&self) -> &str {
        "case-exporter"
    }

    fn load_flow_converged(&mut self, ctx: &RunningContext<'_>, _violations: &[LimitViolation]) {
        match self.export(ctx) {
            Ok(path) => tracing::debug!(path = %path.display(), "case exported"),
            Err(e) => tracing::error!(
                scenario = ctx.scenario_label(),
                round = ctx.round(),
                error = %e,
                "case export failed"
            ),
        }
    }
}
