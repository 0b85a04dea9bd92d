use super::{DataType, DatasetError};

/// A Rust type that can be stored in a dataset of a matching [`DataType`].
///
/// Elements are converted to and from the little-endian byte order used on disk.
pub trait Element: bytemuck::Pod + Send + Sync {
    /// The data type of this element type.
    const DATA_TYPE: DataType;

    /// Convert elements to little-endian bytes.
    fn into_le_bytes(elements: &[Self]) -> Vec<u8>;

    /// Convert little-endian bytes to elements.
    ///
    /// The length of `bytes` must be a multiple of the element size, trailing bytes are ignored.
    fn from_le_bytes(bytes: &[u8]) -> Vec<Self>;
}

macro_rules! impl_element {
    ($t:ty, $data_type:expr) => {
        impl Element for $t {
            const DATA_TYPE: DataType = $data_type;

            fn into_le_bytes(elements: &[Self]) -> Vec<u8> {
                #[cfg(target_endian = "little")]
                {
                    bytemuck::cast_slice(elements).to_vec()
                }
                #[cfg(not(target_endian = "little"))]
                {
                    elements.iter().flat_map(|element| element.to_le_bytes()).collect()
                }
            }

            fn from_le_bytes(bytes: &[u8]) -> Vec<Self> {
                let bytes = &bytes[..bytes.len() - bytes.len() % std::mem::size_of::<Self>()];
                #[cfg(target_endian = "little")]
                {
                    bytemuck::pod_collect_to_vec(bytes)
                }
                #[cfg(not(target_endian = "little"))]
                {
                    bytes
                        .chunks_exact(std::mem::size_of::<Self>())
                        .map(|element| <$t>::from_le_bytes(bytemuck::pod_read_unaligned(element)))
                        .collect()
                }
            }
        }
    };
}

impl_element!(i8, DataType::Int8);
impl_element!(i16, DataType::Int16);
impl_element!(i32, DataType::Int32);
impl_element!(i64, DataType::Int64);
impl_element!(u8, DataType::UInt8);
impl_element!(u16, DataType::UInt16);
impl_element!(u32, DataType::UInt32);
impl_element!(u64, DataType::UInt64);
impl_element!(f32, DataType::Float32);
impl_element!(f64, DataType::Float64);

/// Check that `T` matches the dataset `data_type`.
pub(crate) fn validate_element_type<T: Element>(data_type: DataType) -> Result<(), DatasetError> {
    if T::DATA_TYPE == data_type {
        Ok(())
    } else {
        Err(DatasetError::IncompatibleElementType(T::DATA_TYPE, data_type))
    }
}
