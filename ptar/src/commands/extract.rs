use ptar_format::{Decoder, Extractor};

use crate::error::Result;

pub fn run(verbose: bool) -> Result<()> {
    let input = super::stdin_file()?;

    let mut extractor = Extractor::new(".");
    if verbose {
        extractor = extractor.on_entry(|entry| eprintln!("{}", entry.path));
    }

    let mut decoder = Decoder::new(input);
    decoder.decode(&mut extractor)?;
    let stats = extractor.finish()?;

    tracing::debug!(
        files = stats.files_extracted,
        dirs = stats.dirs_created,
        links = stats.links_created,
        nodes = stats.nodes_created,
        bytes = stats.bytes_written,
        "extracted archive"
    );
    Ok(())
}
