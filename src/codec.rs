//! Object body encoding: transparent gzip on read, optional gzip on write.

use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

use crate::error::TransformError;

const GZ_SUFFIX: &str = ".gz";

/// Returns the plain body of an object, inflating keys that end in `.gz`.
pub fn decode(key: &str, body: Bytes) -> Result<Bytes, TransformError> {
    if !key.ends_with(GZ_SUFFIX) {
        return Ok(body);
    }
    let mut decoder = GzDecoder::new(body.as_ref());
    let mut plain = Vec::new();
    decoder.read_to_end(&mut plain)?;
    Ok(Bytes::from(plain))
}

/// Encodes an output body, gzip-compressing it when requested.
pub fn encode(body: Vec<u8>, gzip: bool) -> Result<Bytes, TransformError> {
    if !gzip {
        return Ok(Bytes::from(body));
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&body)?;
    Ok(Bytes::from(encoder.finish()?))
}

/// Output key for an input key: any `.gz` suffix is dropped and re-added only
/// when the output is compressed.
pub fn output_key(key: &str, gzip: bool) -> String {
    let base = key.strip_suffix(GZ_SUFFIX).unwrap_or(key);
    if gzip {
        format!("{base}{GZ_SUFFIX}")
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_body_decodes_by_key() {
        let packed = encode(b"a,b\n1,2\n".to_vec(), true).unwrap();
        assert_ne!(packed.as_ref(), b"a,b\n1,2\n");

        let plain = decode("turnstile_20210303.txt.gz", packed).unwrap();
        assert_eq!(plain.as_ref(), b"a,b\n1,2\n");
    }

    #[test]
    fn test_plain_key_passes_through() {
        let body = Bytes::from_static(b"\x1f\x8bnot really gzip");
        assert_eq!(decode("file.csv", body.clone()).unwrap(), body);
    }

    #[test]
    fn test_output_key() {
        assert_eq!(output_key("a.txt.gz", false), "a.txt");
        assert_eq!(output_key("a.txt", true), "a.txt.gz");
        assert_eq!(output_key("a.txt.gz", true), "a.txt.gz");
    }
}
