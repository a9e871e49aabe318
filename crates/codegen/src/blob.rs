//! C++ definitions for data compiled into the binary as static arrays.
//!
//! Every generated accessor returns exactly the bytes (or text) it was
//! created from; with compression the data is Brotli-encoded and decoded on
//! first use, with the decoded size checked against the original.

use std::fmt::Write as _;

use crate::CodegenResult;

const BROTLI_MAX_QUALITY: i32 = 11;
const BROTLI_DEFAULT_WINDOW: i32 = 22;

/// Code units of a string as the engine expects them: one byte per unit if
/// every UTF-16 unit fits into Latin-1, two bytes otherwise
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringUnits {
    OneByte(Vec<u8>),
    TwoByte(Vec<u16>),
}

impl StringUnits {
    pub fn encode(source: &str) -> Self {
        let units: Vec<u16> = source.encode_utf16().collect();
        if units.iter().all(|u| *u <= 0xff) {
            Self::OneByte(units.into_iter().map(|u| u as u8).collect())
        } else {
            Self::TwoByte(units)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::OneByte(units) => units.len(),
            Self::TwoByte(units) => units.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `Local<String> {name}(Isolate*)` returning `source`
///
/// # Errors
///
/// Fails only if compression fails
pub fn string_definition(name: &str, source: &str, compress: bool) -> CodegenResult<String> {
    if compress {
        let raw = format!("{name}_raw");
        let mut out = compressed_definition(&raw, source.as_bytes())?;
        write!(
            out,
            r"
Local<String> {name}(Isolate* isolate) {{
  std::string raw = {raw}();
  return String::NewFromUtf8(
      isolate, raw.data(), NewStringType::kNormal, static_cast<int>(raw.size()))
      .ToLocalChecked();
}}
"
        )
        .ok();
        return Ok(out);
    }

    let units = StringUnits::encode(source);
    let (unit_type, width, array) = match &units {
        StringUnits::OneByte(units) => ("uint8_t", "One", array_literal(units)),
        StringUnits::TwoByte(units) => ("uint16_t", "Two", array_literal(units)),
    };
    let len = units.len();
    Ok(format!(
        r#"
static const {unit_type} {name}_source_[] = {{ {array} }};
static_assert(
    {len} <= v8::String::kMaxLength,
    "embedded string exceeds max string length");
Local<String> {name}(Isolate* isolate) {{
  return String::NewFrom{width}Byte(
      isolate, {name}_source_, NewStringType::kNormal, {len})
      .ToLocalChecked();
}}
"#
    ))
}

/// `std::vector<char> {name}()` returning `bytes`
///
/// # Errors
///
/// Fails only if compression fails
pub fn buffer_definition(name: &str, bytes: &[u8], compress: bool) -> CodegenResult<String> {
    if compress {
        let raw = format!("{name}_raw");
        let mut out = compressed_definition(&raw, bytes)?;
        write!(
            out,
            r"
std::vector<char> {name}() {{
  std::string raw = {raw}();
  return std::vector<char>(raw.begin(), raw.end());
}}
"
        )
        .ok();
        return Ok(out);
    }

    let len = bytes.len();
    Ok(format!(
        r"
static const uint8_t {name}_source_[] = {{ {array} }};
std::vector<char> {name}() {{
  const char* data = reinterpret_cast<const char*>({name}_source_);
  return std::vector<char>(data, data + {len});
}}
",
        array = array_literal(bytes),
    ))
}

/// `std::string {name}()` decoding a Brotli-compressed copy of `bytes`
///
/// # Errors
///
/// Fails if the encoder reports an IO error
pub fn compressed_definition(name: &str, bytes: &[u8]) -> CodegenResult<String> {
    let compressed = compress(bytes)?;
    let len = bytes.len();
    let compressed_len = compressed.len();
    log::debug!("Compressed {name} from {len} to {compressed_len} bytes");
    Ok(format!(
        r"
static const uint8_t {name}_source_[] = {{ {array} }};
std::string {name}() {{
  size_t decoded_size = {len};
  std::string dst(decoded_size, 0);
  const auto result = BrotliDecoderDecompress(
      {compressed_len},
      {name}_source_,
      &decoded_size,
      reinterpret_cast<uint8_t*>(&dst[0]));
  assert(result == BROTLI_DECODER_RESULT_SUCCESS);
  assert(decoded_size == {len});
  return dst;
}}
",
        array = array_literal(&compressed),
    ))
}

/// Brotli at maximum quality, the same settings the generated decoder expects
///
/// # Errors
///
/// Fails if the encoder reports an IO error
pub fn compress(bytes: &[u8]) -> CodegenResult<Vec<u8>> {
    let mut params = brotli::enc::BrotliEncoderParams::default();
    params.quality = BROTLI_MAX_QUALITY;
    params.lgwin = BROTLI_DEFAULT_WINDOW;
    params.size_hint = bytes.len();
    let mut out = Vec::new();
    brotli::BrotliCompress(&mut &bytes[..], &mut out, &params)?;
    Ok(out)
}

/// Comma separated array initializer. Zero-length arrays are not valid C++,
/// so an empty input gets a single padding element (callers never read it).
fn array_literal<T: std::fmt::Display>(values: &[T]) -> String {
    if values.is_empty() {
        return "0".into();
    }
    let mut out = String::with_capacity(values.len() * 4);
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
            if i % 32 == 0 {
                out.push('\n');
            }
        }
        write!(out, "{value}").ok();
    }
    out
}
