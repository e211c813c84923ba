use super::DataError;
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Download a file over HTTPS and return its raw bytes.
///
/// Progress is reported on stderr with an [indicatif] progress bar; `message`
/// is the bar label.
pub fn download_file_as_bytes(url: &str, message: &str) -> Result<Vec<u8>, DataError> {
    let response = ureq::get(url).call().map_err(|source| DataError::Download {
        url: url.to_string(),
        source: Box::new(source),
    })?;

    let content_length = response
        .header("Content-Length")
        .and_then(|len| len.parse::<u64>().ok());

    let bar = match content_length {
        Some(len) => ProgressBar::new(len).with_style(
            ProgressStyle::with_template("{msg} [{bar:40}] {bytes}/{total_bytes}")
                .expect("progress bar template is well formed"),
        ),
        None => ProgressBar::new_spinner(),
    };
    bar.set_message(message.to_string());

    let mut bytes = match content_length {
        Some(len) => Vec::with_capacity(len as usize),
        None => Vec::new(),
    };
    bar.wrap_read(response.into_reader())
        .read_to_end(&mut bytes)?;
    bar.finish();

    Ok(bytes)
}

/// Download a gzipped file from `url` and write the decoded content to
/// `dest_dir/name`. Files already present on disk are kept as-is.
pub fn fetch_gz_file(url: &str, name: &str, dest_dir: &Path) -> Result<PathBuf, DataError> {
    let file_name = dest_dir.join(name);

    if !file_name.exists() {
        let bytes = download_file_as_bytes(&format!("{url}{name}.gz"), name)?;
        write_gunzipped(&bytes, &file_name)?;
    }

    Ok(file_name)
}

/// Decode gzip content and write it to `file_name`.
///
/// The decode goes through a sibling `.partial` file that is renamed into
/// place only once the whole stream decoded, so a failed decode never leaves
/// a truncated file at the final path (the existence of that path is what
/// marks the cache entry as valid).
fn write_gunzipped(bytes: &[u8], file_name: &Path) -> Result<(), DataError> {
    let partial = file_name.with_added_extension("partial");

    let mut output_file = File::create(&partial)?;
    let mut gz_buffer = GzDecoder::new(bytes);
    if let Err(err) = std::io::copy(&mut gz_buffer, &mut output_file) {
        drop(output_file);
        let _ = std::fs::remove_file(&partial);
        return Err(err.into());
    }

    std::fs::rename(&partial, file_name)?;
    Ok(())
}
