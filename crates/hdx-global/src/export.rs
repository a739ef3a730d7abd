//! Delimited text exports of a [`FitResult`].

use hdx_core::{ErrorInfo, HdxError};

use crate::result::FitResult;

fn export_error(err: impl ToString) -> HdxError {
    HdxError::Serde(ErrorInfo::new("fit_export", err.to_string()))
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, HdxError> {
    let bytes = writer.into_inner().map_err(export_error)?;
    String::from_utf8(bytes).map_err(export_error)
}

impl FitResult {
    /// `# key: value` metadata lines followed by the table
    /// `state,r_number,dG,k_obs,covariance`.
    pub fn to_delimited(&self) -> Result<String, HdxError> {
        let convergence = self.convergence();
        let mut header = String::new();
        let mut meta = |key: &str, value: String| {
            header.push_str(&format!("# {key}: {value}\n"));
        };
        meta("states", self.states().join(";"));
        meta("r_start", self.r_numbers().first().copied().unwrap_or(0).to_string());
        meta("r_end", self.r_numbers().last().copied().unwrap_or(0).to_string());
        meta("stop_reason", convergence.stop_reason.as_str().to_string());
        meta("epochs_run", convergence.epochs_run.to_string());
        meta(
            "best_epoch",
            convergence
                .best_epoch
                .map(|e| e.to_string())
                .unwrap_or_else(|| "none".to_string()),
        );
        meta("best_loss", convergence.best_loss.to_string());
        meta("r1", self.config().r1.to_string());
        meta("r2", self.config().r2.to_string());
        meta(
            "scales",
            self.scales()
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(";"),
        );
        meta("hash", self.hash().to_string());

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["state", "r_number", "dG", "k_obs", "covariance"])
            .map_err(export_error)?;
        for row in self.output() {
            writer
                .write_record([
                    row.state,
                    row.r_number.to_string(),
                    row.deltag.to_string(),
                    row.k_obs.to_string(),
                    row.covariance.to_string(),
                ])
                .map_err(export_error)?;
        }
        Ok(header + &finish(writer)?)
    }

    /// Loss curve table `epoch,loss,data_loss,reg1,reg2`.
    pub fn losses_to_delimited(&self) -> Result<String, HdxError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["epoch", "loss", "data_loss", "reg1", "reg2"])
            .map_err(export_error)?;
        for record in self.losses() {
            writer
                .write_record([
                    record.epoch.to_string(),
                    record.loss.to_string(),
                    record.data_loss.to_string(),
                    record.reg1.to_string(),
                    record.reg2.to_string(),
                ])
                .map_err(export_error)?;
        }
        finish(writer)
    }
}
