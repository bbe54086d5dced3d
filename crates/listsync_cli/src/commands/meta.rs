use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;

use super::shared::CommandResult;
use crate::Cli;

const BIN_NAME: &str = "listsync";
const MANUAL: &str = "listsync Manual";

/// One rendered man page.
struct ManPage {
    /// Page name, `listsync` or `listsync-<subcommand>`.
    name: String,
    roff: Vec<u8>,
}

impl ManPage {
    fn file_name(&self) -> String {
        format!("{}.1", self.name)
    }
}

fn render(cmd: clap::Command) -> Result<ManPage, std::io::Error> {
    let name = cmd.get_name().to_string();
    let man = clap_mangen::Man::new(cmd)
        .source(format!("{} {}", BIN_NAME, env!("CARGO_PKG_VERSION")))
        .manual(MANUAL);
    let mut roff = Vec::new();
    man.render(&mut roff)?;
    Ok(ManPage { name, roff })
}

/// The main page followed by one `listsync-<sub>` page per subcommand.
fn man_pages() -> Result<Vec<ManPage>, std::io::Error> {
    let cmd = Cli::command();
    let mut pages = vec![render(cmd.clone())?];
    for sub in cmd.get_subcommands() {
        let page_name = format!("{}-{}", BIN_NAME, sub.get_name());
        pages.push(render(sub.clone().name(page_name))?);
    }
    Ok(pages)
}

fn completion_script(shell: clap_complete::Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let mut out = Vec::new();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut out);
    out
}

fn write_output(bytes: &[u8], output: Option<&Path>) -> CommandResult {
    match output {
        Some(path) => std::fs::write(path, bytes)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?,
        None => std::io::stdout().write_all(bytes)?,
    }
    Ok(())
}

pub(crate) fn handle_completions(
    shell: clap_complete::Shell,
    output: Option<PathBuf>,
) -> CommandResult {
    write_output(&completion_script(shell), output.as_deref())?;
    if let Some(path) = output {
        eprintln!("Wrote {} completions to {}", shell, path.display());
    }
    Ok(())
}

/// Print the main page, or write every page into `output`.
pub(crate) fn handle_man(output: Option<PathBuf>) -> CommandResult {
    let pages = man_pages()?;

    let Some(dir) = output else {
        let main = pages.first().ok_or("No man page rendered")?;
        return write_output(&main.roff, None);
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
    for page in &pages {
        write_output(&page.roff, Some(dir.join(page.file_name()).as_path()))?;
    }
    println!("Generated {} man pages in: {}", pages.len(), dir.display());
    Ok(())
}
