//! JSON-lines product export
//!
//! One object per line in the camelCase shape the uploader reads
//! (`itemId`, `itemName`, `itemUrl`, `currentPrice`, ...).

use crate::storage::{ProductRecord, Storage};
use crate::PricewatchError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes every product of a run to `path` as JSON lines
///
/// # Returns
///
/// The number of products written
pub fn export_products(
    storage: &dyn Storage,
    run_id: i64,
    path: &Path,
) -> Result<usize, PricewatchError> {
    let products = storage.load_products(run_id)?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_products(&products, &mut writer)?;
    writer.flush()?;

    Ok(products.len())
}

/// Serializes products as JSON lines into `writer`
pub fn write_products<W: Write>(
    products: &[ProductRecord],
    writer: &mut W,
) -> Result<(), PricewatchError> {
    for product in products {
        serde_json::to_writer(&mut *writer, product)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
