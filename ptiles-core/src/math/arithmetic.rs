/// Trait for aligning a numeric value to a given byte boundary
///
/// # Example
/// ```
/// # use ptiles_core::math::*;
/// assert_eq!(8, 5_u32.align_to(8));
/// ```
pub trait Alignable {
    /// Align the associated value to an `alignment` bytes boundary
    fn align_to(&self, alignment: Self) -> Self;
}

macro_rules! impl_alignable {
    ($($type:ty),*) => {
        $(
            impl Alignable for $type {
                fn align_to(&self, alignment: Self) -> Self {
                    if alignment == 0 {
                        *self
                    } else {
                        ((self + alignment - 1) / alignment) * alignment
                    }
                }
            }
        )*
    };
}

impl_alignable!(u32, u64, usize);

#[cfg(test)]
mod tests {
    use super::Alignable;

    #[test]
    fn test_align_to() {
        assert_eq!(1_u32.align_to(0), 1);
        assert_eq!(0_usize.align_to(8), 0);
        assert_eq!(27_u64.align_to(8), 32);
        assert_eq!(8_usize.align_to(8), 8);
    }
}
