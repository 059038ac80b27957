// String-table payloads come in two flavors depending on replay age:
// old replays carry valve's LZSS (utils/lzss.cpp), new ones snappy blocks.
// The format is announced by a 4-byte magic, there is no other signal.

const LZSS_MAGIC: &[u8; 4] = b"LZSS";
const LZSS_LOOKSHIFT: usize = 4;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // 3rd party crates
    #[error(transparent)]
    Snap(#[from] snap::Error),
    // mod
    #[error("lzss input is truncated")]
    LzssTruncated,
    #[error("lzss back-reference points before the start of output")]
    LzssInvalidBackRef,
    #[error("lzss length mismatch (header says {expected}, got {got})")]
    LzssLengthMismatch { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Decompresses a string-table blob, dispatching on the leading magic:
/// `LZSS` selects the sliding-window format, anything else is treated as a
/// snappy block.
pub fn decompress(buf: &[u8]) -> Result<Vec<u8>> {
    if buf.len() >= LZSS_MAGIC.len() && &buf[..LZSS_MAGIC.len()] == LZSS_MAGIC {
        decompress_lzss(buf)
    } else {
        Ok(snap::raw::Decoder::new().decompress_vec(buf)?)
    }
}

// CLZSS::Uncompress from utils/lzss.cpp: after the magic and a 32-bit
// little-endian uncompressed length, control bytes carry 8 flags consumed
// from the low bit up; flag 1 is a back-reference of two bytes holding a
// 12-bit offset and a 4-bit count (count 1 terminates the stream), flag 0 a
// literal byte. Offsets address `position + 1` bytes back in the output, so
// the window is 4096 bytes.
fn decompress_lzss(buf: &[u8]) -> Result<Vec<u8>> {
    if buf.len() < 8 {
        return Err(Error::LzssTruncated);
    }
    let expected = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;

    let mut out: Vec<u8> = Vec::with_capacity(expected);
    let mut pos: usize = 8;
    let mut cmd_byte: u8 = 0;
    let mut get_cmd_byte: u8 = 0;

    let next = |pos: &mut usize| -> Result<u8> {
        let b = *buf.get(*pos).ok_or(Error::LzssTruncated)?;
        *pos += 1;
        Ok(b)
    };

    loop {
        if get_cmd_byte == 0 {
            cmd_byte = next(&mut pos)?;
        }
        get_cmd_byte = (get_cmd_byte + 1) & 0x07;

        if cmd_byte & 0x01 != 0 {
            let b0 = next(&mut pos)? as usize;
            let b1 = next(&mut pos)? as usize;
            let offset = (b0 << LZSS_LOOKSHIFT) | (b1 >> LZSS_LOOKSHIFT);
            let count = (b1 & 0x0f) + 1;
            if count == 1 {
                break;
            }
            let src = out
                .len()
                .checked_sub(offset + 1)
                .ok_or(Error::LzssInvalidBackRef)?;
            // the copy may overlap its own output (run-length style)
            for i in 0..count {
                let b = out[src + i];
                out.push(b);
            }
        } else {
            out.push(next(&mut pos)?);
        }

        cmd_byte >>= 1;
    }

    if out.len() != expected {
        return Err(Error::LzssLengthMismatch {
            expected,
            got: out.len(),
        });
    }
    Ok(out)
}
