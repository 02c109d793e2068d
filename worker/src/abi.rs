// ==============================================================================
// abi.rs - Contract ABI Codec
// ==============================================================================
// Description: Call encoding and return decoding for the analysis contract
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2025-12-02
// Version: 1.1.0
// ==============================================================================
// Supports exactly the closed type set the contract surface needs:
// uint256, address, bytes21, string, uint256[]. Dynamic arguments place a
// 32-byte offset in the head area, measured from the start of the argument
// block (the byte after the 4-byte selector), with their length-prefixed
// payload in the tail area.
// ==============================================================================

use primitive_types::U256;
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// ABI word size in bytes
const WORD: usize = 32;

/// Supported parameter types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Uint256,
    Address,
    Bytes21,
    String,
    Uint256Array,
}

/// A decoded or to-be-encoded ABI value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint256(U256),
    Address([u8; 20]),
    Bytes21([u8; 21]),
    String(String),
    Uint256Array(Vec<U256>),
}

impl Token {
    pub fn param_type(&self) -> ParamType {
        match self {
            Token::Uint256(_) => ParamType::Uint256,
            Token::Address(_) => ParamType::Address,
            Token::Bytes21(_) => ParamType::Bytes21,
            Token::String(_) => ParamType::String,
            Token::Uint256Array(_) => ParamType::Uint256Array,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Token::Uint256(_) => "uint256",
            Token::Address(_) => "address",
            Token::Bytes21(_) => "bytes21",
            Token::String(_) => "string",
            Token::Uint256Array(_) => "uint256[]",
        }
    }

    pub fn into_uint256(self) -> Result<U256, AbiDecodeError> {
        match self {
            Token::Uint256(value) => Ok(value),
            other => Err(AbiDecodeError::UnexpectedToken {
                expected: "uint256",
                actual: other.kind(),
            }),
        }
    }

    pub fn into_address(self) -> Result<[u8; 20], AbiDecodeError> {
        match self {
            Token::Address(value) => Ok(value),
            other => Err(AbiDecodeError::UnexpectedToken {
                expected: "address",
                actual: other.kind(),
            }),
        }
    }

    pub fn into_string(self) -> Result<String, AbiDecodeError> {
        match self {
            Token::String(value) => Ok(value),
            other => Err(AbiDecodeError::UnexpectedToken {
                expected: "string",
                actual: other.kind(),
            }),
        }
    }

    pub fn into_uint256_array(self) -> Result<Vec<U256>, AbiDecodeError> {
        match self {
            Token::Uint256Array(value) => Ok(value),
            other => Err(AbiDecodeError::UnexpectedToken {
                expected: "uint256[]",
                actual: other.kind(),
            }),
        }
    }
}

/// Static description of one contract function
#[derive(Debug, Clone, Copy)]
pub struct Function {
    pub name: &'static str,
    pub signature: &'static str,
    pub inputs: &'static [ParamType],
    pub outputs: &'static [ParamType],
}

impl Function {
    pub fn selector(&self) -> [u8; 4] {
        selector(self.signature)
    }
}

pub const GET_PENDING_REQUESTS: Function = Function {
    name: "getPendingRequests",
    signature: "getPendingRequests()",
    inputs: &[],
    outputs: &[ParamType::Uint256Array],
};

pub const GET_ANALYSIS_REQUEST: Function = Function {
    name: "getAnalysisRequest",
    signature: "getAnalysisRequest(uint256)",
    inputs: &[ParamType::Uint256],
    outputs: &[
        ParamType::Address,
        ParamType::Address,
        ParamType::Address,
        ParamType::String,
        ParamType::String,
        ParamType::Uint256,
        ParamType::Uint256,
    ],
};

pub const GET_SNP_DATA: Function = Function {
    name: "getSNPDataForAnalysis",
    signature: "getSNPDataForAnalysis(uint256)",
    inputs: &[ParamType::Uint256],
    outputs: &[ParamType::String, ParamType::String],
};

pub const SUBMIT_ANALYSIS_RESULT: Function = Function {
    name: "submitAnalysisResult",
    signature: "submitAnalysisResult(uint256,string,uint256,string)",
    inputs: &[
        ParamType::Uint256,
        ParamType::String,
        ParamType::Uint256,
        ParamType::String,
    ],
    outputs: &[],
};

pub const MARK_ANALYSIS_FAILED: Function = Function {
    name: "markAnalysisFailed",
    signature: "markAnalysisFailed(uint256,string)",
    inputs: &[ParamType::Uint256, ParamType::String],
    outputs: &[],
};

/// Errors raised while building call data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiEncodeError {
    #[error("{function} expects {expected} arguments, got {actual}")]
    ArityMismatch {
        function: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("argument {index} of {function}: expected {expected}, got {actual}")]
    TypeMismatch {
        function: &'static str,
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Errors raised while decoding return data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiDecodeError {
    #[error("return data truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("dynamic offset {offset} outside return data of {len} bytes")]
    OffsetOutOfBounds { offset: u64, len: usize },

    #[error("dynamic length {length} outside return data of {len} bytes")]
    LengthOutOfBounds { length: u64, len: usize },

    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("unexpected token kind: expected {expected}, got {actual}")]
    UnexpectedToken {
        expected: &'static str,
        actual: &'static str,
    },
}

/// First 4 bytes of Keccak-256 over the canonical signature string
pub fn selector(signature: &str) -> [u8; 4] {
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Encode a call: selector followed by the argument block
pub fn encode_call(function: &Function, args: &[Token]) -> Result<Vec<u8>, AbiEncodeError> {
    if args.len() != function.inputs.len() {
        return Err(AbiEncodeError::ArityMismatch {
            function: function.name,
            expected: function.inputs.len(),
            actual: args.len(),
        });
    }
    for (index, (token, expected)) in args.iter().zip(function.inputs.iter()).enumerate() {
        if token.param_type() != *expected {
            return Err(AbiEncodeError::TypeMismatch {
                function: function.name,
                index,
                expected: param_name(*expected),
                actual: token.kind(),
            });
        }
    }

    let mut data = Vec::with_capacity(4 + WORD * args.len());
    data.extend_from_slice(&function.selector());
    data.extend_from_slice(&encode_values(args));
    Ok(data)
}

/// Encode a bare value block (no selector); also the wire form of a
/// flat return tuple
pub fn encode_values(tokens: &[Token]) -> Vec<u8> {
    let head_size = WORD * tokens.len();
    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Uint256(value) => head.extend_from_slice(&uint_word(value)),
            Token::Address(bytes) => {
                let mut word = [0u8; WORD];
                word[WORD - 20..].copy_from_slice(bytes);
                head.extend_from_slice(&word);
            }
            Token::Bytes21(bytes) => {
                let mut word = [0u8; WORD];
                word[..21].copy_from_slice(bytes);
                head.extend_from_slice(&word);
            }
            Token::String(value) => {
                let offset = head_size + tail.len();
                head.extend_from_slice(&uint_word(&U256::from(offset)));
                tail.extend_from_slice(&uint_word(&U256::from(value.len())));
                tail.extend_from_slice(value.as_bytes());
                let pad = (WORD - value.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(pad));
            }
            Token::Uint256Array(values) => {
                let offset = head_size + tail.len();
                head.extend_from_slice(&uint_word(&U256::from(offset)));
                tail.extend_from_slice(&uint_word(&U256::from(values.len())));
                for value in values {
                    tail.extend_from_slice(&uint_word(value));
                }
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Decode a flat return tuple against the function's output schema
pub fn decode_return(function: &Function, data: &[u8]) -> Result<Vec<Token>, AbiDecodeError> {
    decode_values(function.outputs, data)
}

/// Decode a value block against an explicit type list
pub fn decode_values(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiDecodeError> {
    let mut tokens = Vec::with_capacity(types.len());
    for (index, ty) in types.iter().enumerate() {
        let word = word_at(data, index * WORD)?;
        let token = match ty {
            ParamType::Uint256 => Token::Uint256(U256::from_big_endian(word)),
            ParamType::Address => {
                let mut address = [0u8; 20];
                address.copy_from_slice(&word[WORD - 20..]);
                Token::Address(address)
            }
            ParamType::Bytes21 => {
                let mut bytes = [0u8; 21];
                bytes.copy_from_slice(&word[..21]);
                Token::Bytes21(bytes)
            }
            ParamType::String => {
                let offset = offset_in(data, word)?;
                let length = length_at(data, offset)?;
                let payload = slice_at(data, offset + WORD, length)?;
                let value =
                    String::from_utf8(payload.to_vec()).map_err(|_| AbiDecodeError::InvalidUtf8)?;
                Token::String(value)
            }
            ParamType::Uint256Array => {
                let offset = offset_in(data, word)?;
                let count = length_at(data, offset)?;
                // Elements are whole words; validate the span up front
                let span = count
                    .checked_mul(WORD)
                    .ok_or(AbiDecodeError::LengthOutOfBounds {
                        length: count as u64,
                        len: data.len(),
                    })?;
                slice_at(data, offset + WORD, span)?;
                let mut values = Vec::with_capacity(count);
                for element in 0..count {
                    let element_word = word_at(data, offset + WORD + element * WORD)?;
                    values.push(U256::from_big_endian(element_word));
                }
                Token::Uint256Array(values)
            }
        };
        tokens.push(token);
    }
    Ok(tokens)
}

fn param_name(ty: ParamType) -> &'static str {
    match ty {
        ParamType::Uint256 => "uint256",
        ParamType::Address => "address",
        ParamType::Bytes21 => "bytes21",
        ParamType::String => "string",
        ParamType::Uint256Array => "uint256[]",
    }
}

fn uint_word(value: &U256) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    value.to_big_endian(&mut word);
    word
}

fn word_at(data: &[u8], at: usize) -> Result<&[u8], AbiDecodeError> {
    let end = at.checked_add(WORD).ok_or(AbiDecodeError::Truncated {
        needed: usize::MAX,
        available: data.len(),
    })?;
    if end > data.len() {
        return Err(AbiDecodeError::Truncated {
            needed: end,
            available: data.len(),
        });
    }
    Ok(&data[at..end])
}

/// Read a dynamic offset word and bounds-check it against the block
fn offset_in(data: &[u8], word: &[u8]) -> Result<usize, AbiDecodeError> {
    let raw = U256::from_big_endian(word);
    if raw > U256::from(data.len()) {
        return Err(AbiDecodeError::OffsetOutOfBounds {
            offset: raw.low_u64(),
            len: data.len(),
        });
    }
    Ok(raw.as_usize())
}

/// Read a length word at `offset` and bounds-check it
fn length_at(data: &[u8], offset: usize) -> Result<usize, AbiDecodeError> {
    let word = word_at(data, offset)?;
    let raw = U256::from_big_endian(word);
    if raw > U256::from(data.len()) {
        return Err(AbiDecodeError::LengthOutOfBounds {
            length: raw.low_u64(),
            len: data.len(),
        });
    }
    Ok(raw.as_usize())
}

fn slice_at(data: &[u8], at: usize, len: usize) -> Result<&[u8], AbiDecodeError> {
    let end = at.checked_add(len).ok_or(AbiDecodeError::Truncated {
        needed: usize::MAX,
        available: data.len(),
    })?;
    if end > data.len() {
        return Err(AbiDecodeError::Truncated {
            needed: end,
            available: data.len(),
        });
    }
    Ok(&data[at..end])
}
