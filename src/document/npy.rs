//! NPY (version 1.0) container for numeric buffers
//!
//! Layout: magic `\x93NUMPY`, two version bytes, a little-endian u16 header length,
//! then an ASCII dictionary `{'descr': '<f4', 'fortran_order': False, 'shape': (2, 3), }`
//! padded with spaces and terminated by `\n` so the data starts on a 16-byte boundary.
//! Element bytes follow in C order.

use crate::error::{Error, Result};
use crate::tensor::{element_count, DType, NdBuffer};

pub const MAGIC: [u8; 6] = [0x93, b'N', b'U', b'M', b'P', b'Y'];

const VERSION: (u8, u8) = (1, 0);
const PREAMBLE_LEN: usize = MAGIC.len() + 2 + 2;
const MAX_HEADER_BYTES: usize = u16::MAX as usize;
const ALIGNMENT: usize = 16;

fn format_shape(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [single] => format!("({single},)"),
        _ => {
            let joined = shape
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!("({joined})")
        }
    }
}

fn encode_header(buffer: &NdBuffer) -> Result<Vec<u8>> {
    let dictionary = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        buffer.dtype().npy_descr(),
        format_shape(buffer.shape())
    );
    let unpadded = PREAMBLE_LEN + dictionary.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    let header_len = dictionary.len() + padding + 1;
    if header_len > MAX_HEADER_BYTES {
        return Err(Error::Container(format!(
            "header of {header_len} bytes does not fit a version 1.0 container"
        )));
    }

    let mut header = Vec::with_capacity(header_len);
    header.extend_from_slice(dictionary.as_bytes());
    header.extend(std::iter::repeat(b' ').take(padding));
    header.push(b'\n');
    Ok(header)
}

/// Serialize a buffer into NPY bytes
pub fn write(buffer: &NdBuffer) -> Result<Vec<u8>> {
    let header = encode_header(buffer)?;
    let header_len = u16::try_from(header.len())
        .map_err(|_| Error::Container("header length exceeds u16".to_string()))?;

    let mut out = Vec::with_capacity(PREAMBLE_LEN + header.len() + buffer.nbytes());
    out.extend_from_slice(&MAGIC);
    out.push(VERSION.0);
    out.push(VERSION.1);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(buffer.as_bytes());
    Ok(out)
}

/// Parse NPY bytes back into a buffer
pub fn read(bytes: &[u8]) -> Result<NdBuffer> {
    if bytes.len() < PREAMBLE_LEN || bytes[..MAGIC.len()] != MAGIC {
        return Err(Error::Container("invalid NPY magic".to_string()));
    }
    let version = (bytes[6], bytes[7]);
    if version != VERSION {
        return Err(Error::Container(format!(
            "unsupported NPY version {}.{}",
            version.0, version.1
        )));
    }

    let header_len = usize::from(u16::from_le_bytes([bytes[8], bytes[9]]));
    let data_start = PREAMBLE_LEN + header_len;
    if bytes.len() < data_start {
        return Err(Error::Container(
            "payload truncated before end of header".to_string(),
        ));
    }

    let dictionary = std::str::from_utf8(&bytes[PREAMBLE_LEN..data_start])
        .map_err(|_| Error::Container("header is not ASCII".to_string()))?
        .trim_end();
    if !(dictionary.starts_with('{') && dictionary.ends_with('}')) {
        return Err(Error::Container(
            "header must be a dictionary literal".to_string(),
        ));
    }

    let descr = parse_quoted(field(dictionary, "descr")?)?;
    let dtype = DType::from_npy_descr(descr)
        .ok_or_else(|| Error::Container(format!("unsupported dtype descriptor '{descr}'")))?;

    let fortran_order = field(dictionary, "fortran_order")?;
    if fortran_order.starts_with("True") {
        return Err(Error::Container(
            "Fortran-ordered arrays are not supported".to_string(),
        ));
    }
    if !fortran_order.starts_with("False") {
        return Err(Error::Container(
            "fortran_order must be True or False".to_string(),
        ));
    }

    let shape = parse_shape(field(dictionary, "shape")?)?;
    let expected = element_count(&shape)?
        .checked_mul(dtype.item_size())
        .ok_or_else(|| Error::Container("payload size overflows".to_string()))?;
    let data = &bytes[data_start..];
    if data.len() != expected {
        return Err(Error::Container(format!(
            "payload holds {} bytes but shape {:?} of {} needs {}",
            data.len(),
            shape,
            dtype,
            expected
        )));
    }

    NdBuffer::from_bytes(dtype, &shape, data.to_vec())
}

/// Text following `'key':` in the header dictionary
fn field<'a>(dictionary: &'a str, key: &str) -> Result<&'a str> {
    let quoted = format!("'{key}'");
    let start = dictionary
        .find(&quoted)
        .ok_or_else(|| Error::Container(format!("header is missing '{key}'")))?;
    dictionary[start + quoted.len()..]
        .trim_start()
        .strip_prefix(':')
        .map(str::trim_start)
        .ok_or_else(|| Error::Container(format!("header field '{key}' is missing ':'")))
}

fn parse_quoted(value: &str) -> Result<&str> {
    let quote = value
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| Error::Container("expected a quoted value".to_string()))?;
    let rest = &value[1..];
    let end = rest
        .find(quote)
        .ok_or_else(|| Error::Container("unterminated quoted value".to_string()))?;
    Ok(&rest[..end])
}

fn parse_shape(value: &str) -> Result<Vec<usize>> {
    let inner = value
        .strip_prefix('(')
        .and_then(|rest| rest.find(')').map(|end| &rest[..end]))
        .ok_or_else(|| Error::Container("shape must be a tuple".to_string()))?;

    inner
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<usize>()
                .map_err(|_| Error::Container(format!("invalid shape entry '{token}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_alignment() {
        for shape in [vec![], vec![3], vec![2, 3], vec![1, 1, 1, 1, 1, 7]] {
            let count = shape.iter().product::<usize>();
            let buf = NdBuffer::from_slice(&vec![0i16; count], &shape).unwrap();
            let bytes = write(&buf).unwrap();
            assert_eq!((bytes.len() - buf.nbytes()) % 16, 0, "shape {shape:?}");
            assert_eq!(bytes[bytes.len() - buf.nbytes() - 1], b'\n');
        }
    }

    #[test]
    fn test_known_header_text() {
        let buf = NdBuffer::from_slice(&[1.0f32, 2.0, 3.0], &[3]).unwrap();
        let bytes = write(&buf).unwrap();
        let header = std::str::from_utf8(&bytes[10..bytes.len() - 12]).unwrap();
        assert!(header.starts_with("{'descr': '<f4', 'fortran_order': False, 'shape': (3,), }"));
    }

    #[test]
    fn test_read_write() {
        let buf = NdBuffer::from_slice(&[1u8, 2, 3, 4, 5, 6], &[3, 2]).unwrap();
        assert_eq!(read(&write(&buf).unwrap()).unwrap(), buf);

        let scalar = NdBuffer::from_slice(&[42i64], &[]).unwrap();
        assert_eq!(read(&write(&scalar).unwrap()).unwrap(), scalar);
    }

    #[test]
    fn test_rejects_bad_magic_and_truncation() {
        assert!(read(b"not an npy file").is_err());

        let buf = NdBuffer::from_slice(&[1u32, 2], &[2]).unwrap();
        let bytes = write(&buf).unwrap();
        assert!(read(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_rejects_fortran_order() {
        let buf = NdBuffer::from_slice(&[1u8, 2], &[2]).unwrap();
        let mut bytes = write(&buf).unwrap();
        let pos = bytes.windows(5).position(|w| w == b"False").unwrap();
        bytes[pos..pos + 5].copy_from_slice(b"True ");
        assert!(matches!(read(&bytes), Err(Error::Container(msg)) if msg.contains("Fortran")));
    }
}
