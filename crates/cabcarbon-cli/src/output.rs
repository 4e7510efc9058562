use std::io::{self, Write};

use crate::cli::OutputFormat;
use crate::commands::CommandOutcome;
use crate::error::CliError;

pub fn render(outcome: &CommandOutcome, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(outcome)?
            } else {
                serde_json::to_string(outcome)?
            };
            writeln!(out, "{payload}")?;
        }
        OutputFormat::Text => render_text(&mut out, outcome)?,
    }

    Ok(())
}

fn render_text(out: &mut impl Write, outcome: &CommandOutcome) -> Result<(), CliError> {
    let many = outcome.stages.len() > 1;
    for stage in &outcome.stages {
        if many {
            writeln!(out, "== {} ==", stage.stage)?;
        }
        for line in &stage.lines {
            writeln!(out, "{line}")?;
        }
        if many {
            writeln!(out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::StageReport;

    #[test]
    fn text_output_prints_stage_banners_for_pipelines() {
        let mut load = StageReport::new("load");
        load.line("Yellow: loaded 1 of 12 months, 10 rows");
        let outcome = CommandOutcome {
            command: "run",
            run_id: "r".into(),
            stages: vec![load, StageReport::skipped("clean", "no fleet was loaded")],
        };

        let mut buffer = Vec::new();
        render_text(&mut buffer, &outcome).expect("render");
        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(
            text,
            "== load ==\nYellow: loaded 1 of 12 months, 10 rows\n\n\
             == clean ==\nclean skipped: no fleet was loaded\n\n"
        );
    }

    #[test]
    fn json_output_omits_text_lines() {
        let mut stage = StageReport::new("transform");
        stage.line("Yellow: 3 trips with CO2 estimates");
        let outcome = CommandOutcome {
            command: "transform",
            run_id: "r".into(),
            stages: vec![stage],
        };
        let value = serde_json::to_value(&outcome).expect("json");
        assert_eq!(value["stages"][0]["status"], "completed");
        assert!(value["stages"][0].get("lines").is_none());
    }
}
