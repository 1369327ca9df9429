//! Flat binary persistence of the mixing coefficients.
//!
//! The format is exactly [`COEFFICIENT_COUNT`] little-endian IEEE-754 single precision floats,
//! without header or version, in row order R, G, B and within each row S, H, O, N, broadband.
//! Trailing bytes after the last coefficient are ignored on load.

use std::path::Path;

use crate::{composite::MixMatrix, error::MixError};

/// Number of coefficients in a file.
pub const COEFFICIENT_COUNT: usize = 15;

/// Size of a coefficient file in bytes.
pub const COEFFICIENT_BYTES: usize = COEFFICIENT_COUNT * std::mem::size_of::<f32>();

/// Serialize a matrix to bytes.
pub fn save(matrix: &MixMatrix) -> Vec<u8> {
    matrix
        .coefficients()
        .iter()
        .flat_map(|c| c.to_le_bytes())
        .collect()
}

/// Deserialize a matrix from bytes.
///
/// # Errors
///
/// Returns [`MixError::TruncatedPersistenceData`] if fewer than [`COEFFICIENT_BYTES`] bytes are
/// available.
///
/// # Example
///
/// ```
/// use shomix::composite::MixMatrix;
/// use shomix::persistence::{load, save};
///
/// let matrix = MixMatrix::default();
/// assert_eq!(load(&save(&matrix)).unwrap(), matrix);
/// assert!(load(&[0u8; 40]).is_err());
/// ```
pub fn load(bytes: &[u8]) -> Result<MixMatrix, MixError> {
    if bytes.len() < COEFFICIENT_BYTES {
        return Err(MixError::TruncatedPersistenceData {
            expected: COEFFICIENT_BYTES,
            found: bytes.len(),
        });
    }

    let mut coefficients = [0.0f32; COEFFICIENT_COUNT];
    coefficients
        .iter_mut()
        .zip(bytes.chunks_exact(4))
        .for_each(|(c, chunk)| *c = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));

    Ok(MixMatrix::from_coefficients(coefficients))
}

/// Write a matrix to a coefficient file.
pub fn save_to_path(matrix: &MixMatrix, path: impl AsRef<Path>) -> Result<(), MixError> {
    std::fs::write(path.as_ref(), save(matrix))?;
    log::debug!("saved mixing coefficients to {}", path.as_ref().display());
    Ok(())
}

/// Read a matrix from a coefficient file.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<MixMatrix, MixError> {
    let bytes = std::fs::read(path.as_ref())?;
    let matrix = load(&bytes)?;
    log::debug!("loaded mixing coefficients from {}", path.as_ref().display());
    Ok(matrix)
}
