//! TVM data types
//!
//! Cells, bags of cells and addresses come from `tonlib-core`. This module
//! holds the few conversions the executor needs around them: BOC bytes for
//! the HTTP API, address parsing with our error type and `Coins` amounts.

use crate::error::{ExecutorError, ExecutorResult};

use num_bigint::BigUint;
use tonlib_core::cell::BagOfCells;

pub use tonlib_core::cell::{Cell, CellBuilder};
pub use tonlib_core::TonAddress;

/// Largest value representable by `Coins` (VarUInteger 16)
pub const MAX_COINS: u128 = (1u128 << 120) - 1;

/// Parse a raw (`0:<hex>`) or user-friendly address
pub fn parse_address(raw: &str) -> ExecutorResult<TonAddress> {
    raw.trim()
        .parse::<TonAddress>()
        .map_err(|e| ExecutorError::Address(format!("{:?}: {}", raw, e)))
}

/// `Coins` value for the cell builder
pub fn coins(amount: u128) -> BigUint {
    BigUint::from(amount)
}

/// Serialize a single-root bag of cells with a CRC32C trailer
pub fn to_boc(cell: &Cell) -> ExecutorResult<Vec<u8>> {
    Ok(BagOfCells::from_root(cell.clone()).serialize(true)?)
}

/// Deserialize a single-root bag of cells. Exotic roots (library and pruned
/// branch cells) keep their special flag.
pub fn from_boc(bytes: &[u8]) -> ExecutorResult<Cell> {
    let boc = BagOfCells::parse(bytes)?;
    let root = boc.single_root()?;
    Ok(Cell::clone(root))
}

/// Standard address stored at the start of `cell`, `None` for `addr_none`
pub fn load_address(cell: &Cell) -> ExecutorResult<Option<TonAddress>> {
    let tag = cell.parser().load_u8(2)?;
    if tag == 0 {
        return Ok(None);
    }
    Ok(Some(cell.parser().load_address()?))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Raw address with every hash byte set to `byte`
    pub(crate) fn address(byte: u8) -> TonAddress {
        parse_address(&format!("0:{}", hex::encode([byte; 32]))).unwrap()
    }

    pub(crate) fn empty_cell() -> Cell {
        CellBuilder::new().build().unwrap()
    }

    /// Slice holding a standard address, as get-methods return them
    pub(crate) fn address_slice(address: &TonAddress) -> Cell {
        let mut builder = CellBuilder::new();
        builder.store_address(address).unwrap();
        builder.build().unwrap()
    }

    /// BOC of a library cell referencing the code with hash `[0x5a; 32]`
    pub(crate) fn library_cell_boc() -> Vec<u8> {
        let mut boc = vec![
            0xb5, 0xee, 0x9c, 0x72, // magic
            0x01, // no index, no crc, 1-byte cell refs
            0x01, // 1-byte offsets
            0x01, // cells
            0x01, // roots
            0x00, // absent
            0x23, // total cell size
            0x00, // root index
            0x08, // d1: exotic, no refs
            0x42, // d2: 33 full bytes
            0x02, // library cell tag
        ];
        boc.extend_from_slice(&[0x5a; 32]);
        boc
    }

    #[test]
    fn test_raw_and_friendly_forms_agree() {
        let raw = parse_address("0:83dfd552e63729b472fcbcc8c45ebcc6691702558b68ec7527e1ba403a0f31a8")
            .unwrap();
        let friendly = parse_address("EQCD39VS5jcptHL8vMjEXrzGaRcCVYto7HUn4bpAOg8xqB2N").unwrap();
        assert_eq!(raw, friendly);
        assert_eq!(
            raw.to_hex(),
            "0:83dfd552e63729b472fcbcc8c45ebcc6691702558b68ec7527e1ba403a0f31a8"
        );

        let err = parse_address("not an address").unwrap_err();
        assert!(matches!(err, ExecutorError::Address(_)));
    }

    #[test]
    fn test_library_cell_is_accepted() {
        let cell = from_boc(&library_cell_boc()).unwrap();
        assert_eq!(cell.bit_len(), 264);
        assert_eq!(cell.data()[0], 0x02);
        assert!(cell.references().is_empty());

        // Same bits in an ordinary cell hash differently
        let mut ordinary = CellBuilder::new();
        ordinary.store_u8(8, 0x02).unwrap().store_slice(&[0x5a; 32]).unwrap();
        assert_ne!(ordinary.build().unwrap().cell_hash(), cell.cell_hash());
    }

    #[test]
    fn test_boc_keeps_references() {
        let mut child = CellBuilder::new();
        child.store_u32(32, 0xdead_beef).unwrap();
        let child = std::sync::Arc::new(child.build().unwrap());

        let mut root = CellBuilder::new();
        root.store_bit(true).unwrap().store_reference(&child).unwrap();
        let root = root.build().unwrap();

        let decoded = from_boc(&to_boc(&root).unwrap()).unwrap();
        assert_eq!(decoded, root);
        assert_eq!(decoded.references()[0].parser().load_u32(32).unwrap(), 0xdead_beef);
    }

    #[test]
    fn test_load_address() {
        let addr = address(0x42);
        assert_eq!(load_address(&address_slice(&addr)).unwrap(), Some(addr));

        let mut none = CellBuilder::new();
        none.store_u8(2, 0).unwrap();
        assert_eq!(load_address(&none.build().unwrap()).unwrap(), None);
    }
}
