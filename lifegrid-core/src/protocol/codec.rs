//! JSON message codec for tonic
//!
//! Serializes any serde message into the gRPC frame body. Board rows travel
//! as text with one character per cell (see [`cell_rows`]).

use std::marker::PhantomData;

use bytes::{Buf, BufMut};
use serde::{de::DeserializeOwned, Serialize};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

#[derive(Debug)]
pub struct JsonEncoder<T>(PhantomData<T>);

impl<T: Serialize> Encoder for JsonEncoder<T> {
    type Item = T;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, buf: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        serde_json::to_writer(buf.writer(), &item)
            .map_err(|e| Status::internal(format!("encode failed: {}", e)))
    }
}

#[derive(Debug)]
pub struct JsonDecoder<U>(PhantomData<U>);

impl<U: DeserializeOwned> Decoder for JsonDecoder<U> {
    type Item = U;
    type Error = Status;

    fn decode(&mut self, buf: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        if !buf.has_remaining() {
            return Ok(None);
        }
        let item = serde_json::from_reader(buf.reader())
            .map_err(|e| Status::invalid_argument(format!("decode failed: {}", e)))?;
        Ok(Some(item))
    }
}

/// Codec referenced by the generated service stubs
#[derive(Debug, Clone)]
pub struct JsonCodec<T, U>(PhantomData<(T, U)>);

impl<T, U> Default for JsonCodec<T, U> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T, U> Codec for JsonCodec<T, U>
where
    T: Serialize + Send + 'static,
    U: DeserializeOwned + Send + 'static,
{
    type Encode = T;
    type Decode = U;
    type Encoder = JsonEncoder<T>;
    type Decoder = JsonDecoder<U>;

    fn encoder(&mut self) -> Self::Encoder {
        JsonEncoder(PhantomData)
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonDecoder(PhantomData)
    }
}

/// Serde adapter for [`Rows`](crate::board::Rows): each row is a string of
/// `O` (alive) and `.` (dead), one byte per cell instead of a JSON number.
pub mod cell_rows {
    use serde::de::Error as _;
    use serde::ser::{Error as _, SerializeSeq};
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::board::{Rows, ALIVE, DEAD};

    const ALIVE_CHAR: u8 = b'O';
    const DEAD_CHAR: u8 = b'.';

    pub fn serialize<S: Serializer>(rows: &Rows, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(rows.len()))?;
        for (y, row) in rows.iter().enumerate() {
            let mut text = String::with_capacity(row.len());
            for (x, &cell) in row.iter().enumerate() {
                text.push(match cell {
                    ALIVE => ALIVE_CHAR as char,
                    DEAD => DEAD_CHAR as char,
                    other => {
                        return Err(S::Error::custom(format!(
                            "cell ({}, {}) has value {}",
                            x, y, other
                        )))
                    }
                });
            }
            seq.serialize_element(&text)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Rows, D::Error> {
        let text = Vec::<String>::deserialize(deserializer)?;
        text.into_iter()
            .enumerate()
            .map(|(y, row)| {
                row.bytes()
                    .enumerate()
                    .map(|(x, c)| match c {
                        ALIVE_CHAR => Ok(ALIVE),
                        DEAD_CHAR => Ok(DEAD),
                        _ => Err(D::Error::custom(format!(
                            "unknown cell character at ({}, {})",
                            x, y
                        ))),
                    })
                    .collect::<Result<Vec<u8>, D::Error>>()
            })
            .collect()
    }
}
