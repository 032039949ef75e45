use super::value::Value;
use bytes::{BufMut, BytesMut};

/// Encodes a value in canonical form (dictionary keys in byte order).
///
/// # Examples
///
/// ```
/// use tscrape::bencode::{encode, Value};
///
/// let failure = Value::dict([("failure reason", Value::string("unregistered torrent"))]);
/// assert_eq!(encode(&failure), b"d14:failure reason20:unregistered torrente");
/// ```
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf);
    buf.to_vec()
}

fn encode_into(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::Integer(i) => {
            buf.put_u8(b'i');
            buf.put_slice(i.to_string().as_bytes());
            buf.put_u8(b'e');
        }
        Value::Bytes(b) => put_string(b, buf),
        Value::List(items) => {
            buf.put_u8(b'l');
            items.iter().for_each(|item| encode_into(item, buf));
            buf.put_u8(b'e');
        }
        Value::Dict(entries) => {
            buf.put_u8(b'd');
            for (key, val) in entries {
                put_string(key, buf);
                encode_into(val, buf);
            }
            buf.put_u8(b'e');
        }
    }
}

fn put_string(bytes: &[u8], buf: &mut BytesMut) {
    buf.put_slice(bytes.len().to_string().as_bytes());
    buf.put_u8(b':');
    buf.put_slice(bytes);
}
