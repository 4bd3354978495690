use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::ParseError;

/// Upper bound on compression pointers followed while reading one name
const MAX_POINTER_HOPS: usize = 64;

/// Maximum length of a name in wire form
const MAX_NAME_WIRE_LEN: usize = 255;

pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    /// Read the component; `packet_buf` is the whole message, used to follow
    /// compression pointers.
    fn read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<(), ParseError>;

    fn read_labels<E: Endianness>(
        &self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<Vec<String>, ParseError> {
        let mut labels = Vec::new();
        let mut wire_len = 1;
        loop {
            let label_len = reader.read_var::<u8>(8)?;
            match label_len & 0xC0 {
                0x00 => {
                    if label_len == 0 {
                        break;
                    }
                    wire_len += label_len as usize + 1;
                    if wire_len > MAX_NAME_WIRE_LEN {
                        return Err(ParseError::InvalidLabel);
                    }
                    let mut buf = vec![0; label_len as usize];
                    reader.read_bytes(&mut buf)?;
                    labels.push(label_text(&buf)?);
                }
                0xC0 => {
                    let low = reader.read_var::<u8>(8)?;
                    let target = (((label_len & 0x3F) as usize) << 8) | low as usize;
                    let (rest, _) = read_name(packet_buf, target, packet_buf)?;
                    wire_len += rest.iter().map(|l| l.len() + 1).sum::<usize>();
                    if wire_len > MAX_NAME_WIRE_LEN {
                        return Err(ParseError::InvalidLabel);
                    }
                    labels.extend(rest);
                    break;
                }
                _ => return Err(ParseError::InvalidLabel),
            }
        }

        Ok(labels)
    }

    fn write_labels<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<(), ParseError> {
        for label in labels.iter().filter(|l| !l.is_empty()) {
            if label.len() > 63 {
                return Err(ParseError::InvalidLabel);
            }
            writer.write_var::<u8>(8, label.len() as u8)?;
            writer.write_bytes(label.as_bytes())?;
        }
        writer.write_var::<u8>(8, 0)?;

        Ok(())
    }
}

/// Read a possibly compressed name starting at `start` in `data`.
///
/// Compression pointers are resolved against `packet`. Returns the labels and
/// the offset in `data` just past the name.
pub fn read_name(
    data: &[u8],
    start: usize,
    packet: &[u8],
) -> Result<(Vec<String>, usize), ParseError> {
    let mut labels = Vec::new();
    let mut buf = data;
    let mut pos = start;
    let mut end = None;
    let mut hops = 0;
    let mut wire_len = 1;

    loop {
        let len = *buf.get(pos).ok_or(ParseError::InvalidLabel)?;
        match len & 0xC0 {
            0x00 => {
                if len == 0 {
                    pos += 1;
                    break;
                }
                let from = pos + 1;
                let to = from + len as usize;
                let bytes = buf.get(from..to).ok_or(ParseError::InvalidLabel)?;
                wire_len += len as usize + 1;
                if wire_len > MAX_NAME_WIRE_LEN {
                    return Err(ParseError::InvalidLabel);
                }
                labels.push(label_text(bytes)?);
                pos = to;
            }
            0xC0 => {
                let low = *buf.get(pos + 1).ok_or(ParseError::InvalidLabel)?;
                if end.is_none() {
                    end = Some(pos + 2);
                }
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(ParseError::InvalidLabel);
                }
                buf = packet;
                pos = (((len & 0x3F) as usize) << 8) | low as usize;
            }
            _ => return Err(ParseError::InvalidLabel),
        }
    }

    Ok((labels, end.unwrap_or(pos)))
}

fn label_text(bytes: &[u8]) -> Result<String, ParseError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| ParseError::InvalidLabel)
}
