use anyhow::{Context, Result};
use imageforge_lib::job::FinishOutcome;

pub fn cmd_finish() -> Result<()> {
  let coordinator = super::coordinator();
  let outcome = coordinator.finish().context("could not close out the build")?;

  match outcome {
    FinishOutcome::Skipped => println!("No build assigned to this instance"),
    FinishOutcome::Closed { log_object } => {
      println!("Build closed, log uploaded as {}", log_object.name);
    }
  }
  Ok(())
}
