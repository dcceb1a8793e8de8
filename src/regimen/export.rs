use csv::WriterBuilder;
use std::io::Write;

use super::RegimenComparison;
use crate::error::UreaKinError;

impl RegimenComparison {
    /// Write the steady-state weekly PUN of every regimen as CSV
    ///
    /// One row per minute, one column per regimen (`previous_3x`, `new_3x`,
    /// `new_2x`), concentrations in mg/dL.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), UreaKinError> {
        let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);

        let mut header = vec!["minute".to_string()];
        header.extend(self.regimens.iter().map(|r| r.label.column().to_string()));
        writer.write_record(&header)?;

        let rows = self
            .regimens
            .iter()
            .map(|r| r.steady_state.trace.len())
            .max()
            .unwrap_or(0);
        for minute in 0..rows {
            let mut record = vec![minute.to_string()];
            for outcome in &self.regimens {
                record.push(
                    outcome
                        .steady_state
                        .trace
                        .at(minute)
                        .map(|c| format!("{:.4}", c))
                        .unwrap_or_default(),
                );
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Serialize the whole comparison, traces included
    pub fn to_json(&self) -> Result<String, UreaKinError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{RegimenLabel, RegimenOutcome};
    use super::*;
    use crate::simulator::{ConcentrationTrace, SolverResult};

    fn outcome(label: RegimenLabel, values: Vec<f64>) -> RegimenOutcome {
        RegimenOutcome {
            label,
            session_minutes: 240,
            prescription: None,
            steady_state: SolverResult {
                value: values[0],
                trace: ConcentrationTrace::try_from(values).unwrap(),
                iterations: 1,
                converged: true,
            },
            apc: 0.0,
            tac: 0.0,
            warnings: vec![],
        }
    }

    #[test]
    fn test_csv_layout() {
        let comparison = RegimenComparison {
            volume_l: 35.0,
            dialyzer_clearance: 200.0,
            generation_rate: 8.0,
            calibration: None,
            regimens: vec![
                outcome(RegimenLabel::PreviousThrice, vec![60.0, 59.5]),
                outcome(RegimenLabel::NewTwice, vec![70.0, 69.25]),
            ],
        };
        let mut buffer = Vec::new();
        comparison.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "minute,previous_3x,new_2x");
        assert_eq!(lines[1], "0,60.0000,70.0000");
        assert_eq!(lines[2], "1,59.5000,69.2500");
        assert_eq!(lines.len(), 3);
    }
}
