use crate::driver::RunReport;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

impl RunReport {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::Report(e.to_string()))?;
        let report: Self =
            serde_json::from_str(&content).map_err(|e| Error::Report(e.to_string()))?;
        Ok(report)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| Error::Report(e.to_string()))?;
        fs::write(path, content).map_err(|e| Error::Report(e.to_string()))?;
        Ok(())
    }
}
