use super::{colorize_flag, fail, json_pretty, EXIT_SUCCESS};
use envroot_core::inspect_environment;
use std::path::Path;

pub fn run(dest: &Path, json: bool) -> Result<u8, String> {
    let info = match inspect_environment(dest) {
        Ok(i) => i,
        Err(e) => return Ok(fail(&e)),
    };
    if json {
        println!("{}", json_pretty(&info)?);
    } else {
        let layout = &info.layout;
        println!("root:             {}", layout.root().display());
        println!("version:          {}", layout.version());
        println!("library_dir:      {}", layout.library_dir().display());
        println!("executable_dir:   {}", layout.executable_dir().display());
        println!("original_prefix:  {}", info.original_prefix);
        println!(
            "global packages:  {}",
            colorize_flag(info.include_global_packages)
        );
        println!(
            "launcher:         {}",
            info.launcher
                .as_deref()
                .map_or_else(|| "(missing)".to_owned(), |p| p.display().to_string())
        );
        println!("relocatable:      {}", colorize_flag(info.activation_helper));
        for file in &info.path_files {
            println!("path file:        {}", file.display());
        }
    }
    Ok(EXIT_SUCCESS)
}
