use crate::error::Result;

pub fn run(unbuffered: bool) -> Result<()> {
    let input = super::stdin_file()?;
    let out = super::output(super::stdout_file()?, unbuffered);

    let count = ptar_format::list(input, out)?;
    tracing::debug!(count, "listed archive");
    Ok(())
}
