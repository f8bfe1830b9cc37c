/// Implements the body encodings shared by every hand-off message: JSON,
/// MessagePack and CBOR, each with its decoding counterpart.
#[macro_export]
macro_rules! impl_message_encodings {
    ($x:ty) => {
        impl $x {
            pub fn to_json(&self) -> Result<String, $crate::EncodingError> {
                serde_json::to_string(self).map_err(|e| $crate::EncodingError::Json(e.to_string()))
            }

            pub fn from_json(s: &str) -> Result<$x, $crate::EncodingError> {
                serde_json::from_str::<$x>(s).map_err(|e| $crate::EncodingError::Json(e.to_string()))
            }

            pub fn to_msgpack(&self) -> Result<Vec<u8>, $crate::EncodingError> {
                rmp_serde::to_vec_named(self)
                    .map_err(|e| $crate::EncodingError::MsgPack(e.to_string()))
            }

            pub fn from_msgpack(b: &[u8]) -> Result<$x, $crate::EncodingError> {
                rmp_serde::from_slice::<$x>(b)
                    .map_err(|e| $crate::EncodingError::MsgPack(e.to_string()))
            }

            pub fn to_cbor(&self) -> Result<Vec<u8>, $crate::EncodingError> {
                let mut b: Vec<u8> = Vec::new();
                ciborium::into_writer(self, &mut b)
                    .map_err(|e| $crate::EncodingError::Cbor(e.to_string()))?;
                Ok(b)
            }

            pub fn from_cbor(b: &[u8]) -> Result<$x, $crate::EncodingError> {
                ciborium::from_reader::<$x, &[u8]>(b)
                    .map_err(|e| $crate::EncodingError::Cbor(e.to_string()))
            }

            pub fn encode(&self, encoding: $crate::Encoding) -> Result<Vec<u8>, $crate::EncodingError> {
                match encoding {
                    $crate::Encoding::Json => self.to_json().map(|s| s.into_bytes()),
                    $crate::Encoding::MsgPack => self.to_msgpack(),
                    $crate::Encoding::Cbor => self.to_cbor(),
                }
            }

            pub fn decode(b: &[u8], encoding: $crate::Encoding) -> Result<$x, $crate::EncodingError> {
                match encoding {
                    $crate::Encoding::Json => std::str::from_utf8(b)
                        .map_err(|e| $crate::EncodingError::Json(e.to_string()))
                        .and_then(<$x>::from_json),
                    $crate::Encoding::MsgPack => <$x>::from_msgpack(b),
                    $crate::Encoding::Cbor => <$x>::from_cbor(b),
                }
            }
        }
    };
}
