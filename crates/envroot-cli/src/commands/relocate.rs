use super::{fail, json_pretty, EXIT_SUCCESS};
use envroot_core::relocate_environment;
use envroot_fs::ProgressLogger;
use std::path::Path;

pub fn run(log: &ProgressLogger, dest: &Path, json: bool) -> Result<u8, String> {
    let report = match relocate_environment(dest, log) {
        Ok(r) => r,
        Err(e) => return Ok(fail(&e)),
    };
    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        println!("scripts rewritten:         {}", report.scripts_rewritten.len());
        println!("scripts already relative:  {}", report.scripts_already_relocated.len());
        println!("path files rewritten:      {}", report.path_files_rewritten.len());
        println!("link records rewritten:    {}", report.link_records_rewritten.len());
        if !report.unwritable.is_empty() {
            println!("unwritable:                {}", report.unwritable.len());
        }
    }
    Ok(EXIT_SUCCESS)
}
