//! Contract ABI codec
//!
//! Solidity ABI v2 encoding for the value types the crowdfunding contracts
//! use. Calls are `selector ++ encode(args)`; return data is `encode(outputs)`.
//!
//! # Layout
//!
//! ```text
//! tuple:   head(t1) .. head(tn) tail(t1) .. tail(tn)
//! head:    static value inline, or 32-byte offset to its tail
//! string:  len ++ utf8 bytes padded to 32
//! T[]:     len ++ tuple(T, T, ...)
//! ```
//!
//! Offsets are relative to the start of the enclosing tuple (or array body).

use crate::chain::types::Address;
use primitive_types::U256;
use sha3::{Digest, Keccak256};
use thiserror::Error;

const WORD: usize = 32;

/// ABI codec errors
#[derive(Error, Debug, PartialEq)]
pub enum AbiError {
    #[error("{function} expects {expected} arguments, got {actual}")]
    ArgumentCount {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("Argument {index} of {function} is not a {expected}")]
    ArgumentType {
        function: String,
        index: usize,
        expected: String,
    },

    #[error("Data too short: need {needed} bytes at offset {offset}, have {available}")]
    OutOfBounds {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Value does not fit in {0}")]
    Overflow(String),

    #[error("Invalid boolean encoding")]
    InvalidBool,

    #[error("Invalid address encoding")]
    InvalidAddress,

    #[error("Invalid UTF-8 in string: {0}")]
    InvalidUtf8(String),

    #[error("Unexpected return shape: {0}")]
    Shape(String),
}

pub type AbiResult<T> = Result<T, AbiError>;

/// Keccak-256 digest
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest = hasher.finalize();

    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Solidity parameter types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Uint(usize),
    Bool,
    String,
    Bytes,
    Array(Box<ParamType>),
    Tuple(Vec<ParamType>),
}

impl ParamType {
    /// Canonical type string used in function signatures
    pub fn canonical(&self) -> String {
        match self {
            ParamType::Address => "address".to_string(),
            ParamType::Uint(bits) => format!("uint{}", bits),
            ParamType::Bool => "bool".to_string(),
            ParamType::String => "string".to_string(),
            ParamType::Bytes => "bytes".to_string(),
            ParamType::Array(inner) => format!("{}[]", inner.canonical()),
            ParamType::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|p| p.canonical()).collect();
                format!("({})", parts.join(","))
            }
        }
    }

    /// Whether the encoding lives in the tail
    pub fn is_dynamic(&self) -> bool {
        match self {
            ParamType::String | ParamType::Bytes | ParamType::Array(_) => true,
            ParamType::Tuple(items) => items.iter().any(|p| p.is_dynamic()),
            _ => false,
        }
    }

    /// Bytes this type occupies in a tuple head
    fn head_size(&self) -> usize {
        match self {
            ParamType::Tuple(items) if !self.is_dynamic() => {
                items.iter().map(|p| p.head_size()).sum()
            }
            _ => WORD,
        }
    }
}

/// A decoded or to-be-encoded ABI value
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Address(Address),
    Uint(U256),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        match self {
            Token::String(_) | Token::Bytes(_) | Token::Array(_) => true,
            Token::Tuple(items) => items.iter().any(|t| t.is_dynamic()),
            _ => false,
        }
    }

    fn head_size(&self) -> usize {
        match self {
            Token::Tuple(items) if !self.is_dynamic() => items.iter().map(|t| t.head_size()).sum(),
            _ => WORD,
        }
    }

    /// Whether this token can be encoded as `param`
    pub fn matches(&self, param: &ParamType) -> bool {
        match (self, param) {
            (Token::Address(_), ParamType::Address) => true,
            (Token::Uint(value), ParamType::Uint(bits)) => *bits >= 256 || value.bits() <= *bits,
            (Token::Bool(_), ParamType::Bool) => true,
            (Token::String(_), ParamType::String) => true,
            (Token::Bytes(_), ParamType::Bytes) => true,
            (Token::Array(items), ParamType::Array(inner)) => items.iter().all(|t| t.matches(inner)),
            (Token::Tuple(items), ParamType::Tuple(params)) => {
                items.len() == params.len()
                    && items.iter().zip(params).all(|(t, p)| t.matches(p))
            }
            _ => false,
        }
    }

    pub fn into_address(self) -> Option<Address> {
        match self {
            Token::Address(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn into_uint(self) -> Option<U256> {
        match self {
            Token::Uint(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_bool(self) -> Option<bool> {
        match self {
            Token::Bool(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Token::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Token>> {
        match self {
            Token::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_tuple(self) -> Option<Vec<Token>> {
        match self {
            Token::Tuple(items) => Some(items),
            _ => None,
        }
    }
}

// ============================================
// Encoding
// ============================================

fn uint_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

fn usize_word(value: usize) -> [u8; 32] {
    uint_word(U256::from(value as u64))
}

fn padded_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(WORD + bytes.len().div_ceil(WORD) * WORD);
    out.extend_from_slice(&usize_word(bytes.len()));
    out.extend_from_slice(bytes);
    let remainder = bytes.len() % WORD;
    if remainder != 0 {
        out.resize(out.len() + (WORD - remainder), 0);
    }
    out
}

fn encode_token(token: &Token) -> Vec<u8> {
    match token {
        Token::Address(addr) => {
            let mut word = vec![0u8; 12];
            word.extend_from_slice(addr.as_bytes());
            word
        }
        Token::Uint(value) => uint_word(*value).to_vec(),
        Token::Bool(flag) => usize_word(usize::from(*flag)).to_vec(),
        Token::String(text) => padded_bytes(text.as_bytes()),
        Token::Bytes(bytes) => padded_bytes(bytes),
        Token::Array(items) => {
            let mut out = usize_word(items.len()).to_vec();
            out.extend(encode(items));
            out
        }
        Token::Tuple(items) => encode(items),
    }
}

/// Encode a sequence of tokens as a tuple
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len: usize = tokens.iter().map(|t| t.head_size()).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&usize_word(head_len + tail.len()));
            tail.extend(encode_token(token));
        } else {
            head.extend(encode_token(token));
        }
    }

    head.extend(tail);
    head
}

// ============================================
// Decoding
// ============================================

fn word_at(data: &[u8], offset: usize) -> AbiResult<&[u8]> {
    data.get(offset..offset + WORD).ok_or(AbiError::OutOfBounds {
        offset,
        needed: WORD,
        available: data.len(),
    })
}

fn usize_at(data: &[u8], offset: usize) -> AbiResult<usize> {
    let value = U256::from_big_endian(word_at(data, offset)?);
    if value > U256::from(u32::MAX) {
        return Err(AbiError::Overflow("offset/length".to_string()));
    }
    Ok(value.low_u64() as usize)
}

fn bytes_at(data: &[u8], offset: usize) -> AbiResult<&[u8]> {
    let len = usize_at(data, offset)?;
    let start = offset + WORD;
    data.get(start..start + len).ok_or(AbiError::OutOfBounds {
        offset: start,
        needed: len,
        available: data.len(),
    })
}

fn decode_at(param: &ParamType, data: &[u8], offset: usize) -> AbiResult<Token> {
    match param {
        ParamType::Address => {
            let word = word_at(data, offset)?;
            if word[..12].iter().any(|b| *b != 0) {
                return Err(AbiError::InvalidAddress);
            }
            Address::from_slice(&word[12..])
                .map(Token::Address)
                .ok_or(AbiError::InvalidAddress)
        }
        ParamType::Uint(bits) => {
            let value = U256::from_big_endian(word_at(data, offset)?);
            if *bits < 256 && value.bits() > *bits {
                return Err(AbiError::Overflow(param.canonical()));
            }
            Ok(Token::Uint(value))
        }
        ParamType::Bool => {
            let value = U256::from_big_endian(word_at(data, offset)?);
            if value.is_zero() {
                Ok(Token::Bool(false))
            } else if value == U256::one() {
                Ok(Token::Bool(true))
            } else {
                Err(AbiError::InvalidBool)
            }
        }
        ParamType::String => {
            let bytes = bytes_at(data, offset)?;
            String::from_utf8(bytes.to_vec())
                .map(Token::String)
                .map_err(|e| AbiError::InvalidUtf8(e.to_string()))
        }
        ParamType::Bytes => Ok(Token::Bytes(bytes_at(data, offset)?.to_vec())),
        ParamType::Array(inner) => {
            let len = usize_at(data, offset)?;
            // Every element takes at least one word
            if len > data.len() / WORD {
                return Err(AbiError::OutOfBounds {
                    offset: offset + WORD,
                    needed: len * WORD,
                    available: data.len(),
                });
            }
            let params = vec![(**inner).clone(); len];
            decode_tuple(&params, data, offset + WORD).map(Token::Array)
        }
        ParamType::Tuple(items) => decode_tuple(items, data, offset).map(Token::Tuple),
    }
}

fn decode_tuple(params: &[ParamType], data: &[u8], base: usize) -> AbiResult<Vec<Token>> {
    let mut cursor = base;
    let mut tokens = Vec::with_capacity(params.len());

    for param in params {
        if param.is_dynamic() {
            let relative = usize_at(data, cursor)?;
            tokens.push(decode_at(param, data, base + relative)?);
        } else {
            tokens.push(decode_at(param, data, cursor)?);
        }
        cursor += param.head_size();
    }

    Ok(tokens)
}

/// Decode `data` as a tuple of `params`
pub fn decode(params: &[ParamType], data: &[u8]) -> AbiResult<Vec<Token>> {
    decode_tuple(params, data, 0)
}

// ============================================
// Functions
// ============================================

/// A contract function: name plus input and output types
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: &'static str,
    pub inputs: Vec<ParamType>,
    pub outputs: Vec<ParamType>,
}

impl Function {
    pub fn new(name: &'static str, inputs: Vec<ParamType>, outputs: Vec<ParamType>) -> Self {
        Self {
            name,
            inputs,
            outputs,
        }
    }

    /// `name(type1,type2)`
    pub fn signature(&self) -> String {
        let inputs: Vec<String> = self.inputs.iter().map(|p| p.canonical()).collect();
        format!("{}({})", self.name, inputs.join(","))
    }

    /// First four bytes of the signature hash
    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature().as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    /// Calldata for this function with `args`
    pub fn encode_call(&self, args: &[Token]) -> AbiResult<Vec<u8>> {
        if args.len() != self.inputs.len() {
            return Err(AbiError::ArgumentCount {
                function: self.name.to_string(),
                expected: self.inputs.len(),
                actual: args.len(),
            });
        }

        for (index, (arg, param)) in args.iter().zip(&self.inputs).enumerate() {
            if !arg.matches(param) {
                return Err(AbiError::ArgumentType {
                    function: self.name.to_string(),
                    index,
                    expected: param.canonical(),
                });
            }
        }

        let mut data = self.selector().to_vec();
        data.extend(encode(args));
        Ok(data)
    }

    /// Decode return data
    pub fn decode_output(&self, data: &[u8]) -> AbiResult<Vec<Token>> {
        decode(&self.outputs, data)
    }
}
