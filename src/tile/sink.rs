use ndarray::{s, Array3, ArrayView3};

/// Destination for assembled tile data.
///
/// Anything that can accept a rectangular block at an offset can receive a
/// fetch, e.g. an in-memory array or a chunked on-disk store.
pub trait VolumeSink {
    /// Extents of the sink in its own axis order.
    fn shape(&self) -> [usize; 3];

    /// Write `block` with its first element at `offset`.
    ///
    /// The block always lies entirely within [`VolumeSink::shape`].
    fn write_block(&mut self, offset: [usize; 3], block: ArrayView3<'_, u8>);
}

impl VolumeSink for Array3<u8> {
    fn shape(&self) -> [usize; 3] {
        let (a, b, c) = self.dim();
        [a, b, c]
    }

    fn write_block(&mut self, offset: [usize; 3], block: ArrayView3<'_, u8>) {
        let (a, b, c) = block.dim();
        self.slice_mut(s![
            offset[0]..offset[0] + a,
            offset[1]..offset[1] + b,
            offset[2]..offset[2] + c
        ])
        .assign(&block);
    }
}
