use crate::MemoryImage;

#[derive(Debug, Clone)]
pub struct BinaryWriteOptions {
    /// Byte used for addresses between the lowest and highest data address
    /// that hold no data. 0xFF matches erased flash.
    pub fill_byte: u8,
}

impl Default for BinaryWriteOptions {
    fn default() -> Self {
        Self { fill_byte: 0xFF }
    }
}

/// A flat binary plus the absolute address of its first byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatBinary {
    pub base_address: u32,
    pub data: Vec<u8>,
}

/// Load a raw binary blob into an image at the given base address. The blob
/// counts as one observed range. Bytes that would land past u32::MAX are dropped.
pub fn parse_binary(data: &[u8], base_address: u32) -> MemoryImage {
    let mut image = MemoryImage::new();
    image.write_bytes(base_address, data);
    image
}

/// Flatten the image from its lowest to its highest address, filling gaps.
/// Returns None for an empty image.
pub fn write_binary(image: &MemoryImage, options: &BinaryWriteOptions) -> Option<FlatBinary> {
    let base_address = image.min_address()?;
    let end = image.max_address()?;
    Some(FlatBinary {
        base_address,
        data: image.flatten(base_address, end, options.fill_byte),
    })
}
