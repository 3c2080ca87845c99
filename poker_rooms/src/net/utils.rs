use bincode::{ErrorKind, deserialize, serialize};
use serde::{Serialize, de::DeserializeOwned};
use std::io::{self, Read, Write};

/// Frames bigger than this are never sent and are rejected as invalid
/// data when received.
pub const MAX_MESSAGE_SIZE: usize = 1 << 20;

pub fn read_prefixed<T: DeserializeOwned, R: Read>(reader: &mut R) -> io::Result<T> {
    // Read the size as a u32
    let mut len_bytes = [0; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(io::ErrorKind::InvalidData.into());
    }

    // Read the remaining data. If we get a would block error,
    // then it's very likely that the sender doesn't follow the
    // prefix protocol. Return an invalid data error to let
    // the readers determine how to handle such senders. It is
    // possible for the would block error to be something that
    // isn't as sketchy, but that should be pretty rare.
    let mut buf = vec![0; len];
    if let Err(error) = reader.read_exact(&mut buf) {
        let kind = match error.kind() {
            io::ErrorKind::WouldBlock => io::ErrorKind::InvalidData,
            error => error,
        };
        return Err(kind.into());
    }

    match deserialize(&buf) {
        Ok(value) => Ok(value),
        Err(error) => match *error {
            ErrorKind::Io(error) => Err(error),
            _ => Err(io::ErrorKind::InvalidData.into()),
        },
    }
}

pub fn write_prefixed<T: Serialize, W: Write>(writer: &mut W, value: &T) -> io::Result<()> {
    match serialize(&value) {
        Ok(serialized) if serialized.len() > MAX_MESSAGE_SIZE => {
            Err(io::ErrorKind::InvalidData.into())
        }
        Ok(serialized) => {
            // Write the size of the serialized data and the serialized data
            // all in one chunk to prevent read-side EOF race conditions.
            let size = serialized.len() as u32;
            let mut buf = Vec::from(size.to_le_bytes());
            buf.extend(serialized);
            writer.write_all(&buf)?;
            Ok(())
        }
        Err(error) => match *error {
            ErrorKind::Io(error) => Err(error),
            _ => Err(io::ErrorKind::InvalidData.into()),
        },
    }
}
