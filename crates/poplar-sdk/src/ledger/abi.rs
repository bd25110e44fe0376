//! Minimal contract ABI codec.
//!
//! Covers exactly the argument and return shapes the registry and token
//! contracts use: static words (address, uint, bool, bytes32), `string`, and
//! the property tuple with its dynamic string members. Amounts are carried as
//! `u128`. Record fields above that range are a decode error; balances and
//! allowances saturate at `u128::MAX`.

use super::traits::{ContractCall, LedgerError};
use crate::address::Address;
use crate::id::{keccak256, EntityId};
use crate::records::{RawProperty, RawStake, RawValidation};

const WORD: usize = 32;

/// Selector of the standard `Error(string)` revert payload
pub const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Canonical function signatures
pub mod signatures {
    pub const APPROVE: &str = "approve(address,uint256)";
    pub const ALLOWANCE: &str = "allowance(address,address)";
    pub const BALANCE_OF: &str = "balanceOf(address)";

    pub const SUBMIT_PROPERTY: &str = "submitProperty(string,string,string,string,string)";
    pub const REQUEST_VALIDATION: &str = "requestValidation(bytes32,uint256)";
    pub const CAST_VALIDATION_VOTE: &str = "castValidationVote(bytes32,uint256,bool)";
    pub const CONCLUDE_VALIDATION: &str = "concludeValidation(bytes32)";
    pub const CLAIM_REWARDS: &str = "claimRewards(bytes32)";

    pub const PROPERTIES_NEEDING_VALIDATION: &str = "getPropertiesNeedingValidation()";
    pub const PROPERTIES: &str = "properties(bytes32)";
    pub const VALIDATIONS: &str = "validations(bytes32)";
    pub const VALIDATION_STAKE: &str = "getValidationStake(bytes32,address)";
    pub const IS_VALID_LOCATION: &str = "isValidLocation(string,string,string)";
    pub const IS_PROPERTY_REGISTERED: &str = "isPropertyRegistered(bytes32)";
}

/// First four bytes of the keccak hash of a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

// ==================== Encoding ====================

/// A single ABI argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u128),
    Bool(bool),
    FixedBytes(EntityId),
    String(String),
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Head/tail encoding of an argument list
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Address(address) => {
                let mut word = [0u8; WORD];
                word[12..].copy_from_slice(address.as_bytes());
                head.extend_from_slice(&word);
            }
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::Bool(value) => head.extend_from_slice(&uint_word(u128::from(*value))),
            Token::FixedBytes(id) => head.extend_from_slice(id.as_bytes()),
            Token::String(value) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                tail.extend_from_slice(&uint_word(value.len() as u128));
                tail.extend_from_slice(value.as_bytes());
                let padding = (WORD - value.len() % WORD) % WORD;
                tail.resize(tail.len() + padding, 0);
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Selector followed by the encoded arguments
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode(tokens));
    data
}

/// Calldata for a write
pub fn encode_contract_call(call: &ContractCall) -> Vec<u8> {
    use signatures::*;

    match call {
        ContractCall::Approve { spender, amount } => encode_call(
            APPROVE,
            &[Token::Address(*spender), Token::Uint(amount.raw())],
        ),
        ContractCall::SubmitProperty {
            location,
            content_hash,
        } => encode_call(
            SUBMIT_PROPERTY,
            &[
                Token::String(location.country.clone()),
                Token::String(location.region.clone()),
                Token::String(location.locality.clone()),
                Token::String(location.parcel.clone()),
                Token::String(content_hash.clone()),
            ],
        ),
        ContractCall::RequestValidation { property_id, fee } => encode_call(
            REQUEST_VALIDATION,
            &[Token::FixedBytes(*property_id), Token::Uint(fee.raw())],
        ),
        ContractCall::CastValidationVote {
            property_id,
            stake,
            support,
        } => encode_call(
            CAST_VALIDATION_VOTE,
            &[
                Token::FixedBytes(*property_id),
                Token::Uint(stake.raw()),
                Token::Bool(*support),
            ],
        ),
        ContractCall::ConcludeValidation { property_id } => {
            encode_call(CONCLUDE_VALIDATION, &[Token::FixedBytes(*property_id)])
        }
        ContractCall::ClaimRewards { property_id } => {
            encode_call(CLAIM_REWARDS, &[Token::FixedBytes(*property_id)])
        }
    }
}

// ==================== Decoding ====================

fn decode_err(message: impl Into<String>) -> LedgerError {
    LedgerError::Decode(message.into())
}

/// Bounds-checked view over return data
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word(&self, offset: usize) -> Result<&'a [u8], LedgerError> {
        let end = offset
            .checked_add(WORD)
            .ok_or_else(|| decode_err("offset overflow"))?;
        self.data.get(offset..end).ok_or_else(|| {
            decode_err(format!(
                "return data too short: need {end} bytes, have {}",
                self.data.len()
            ))
        })
    }

    fn uint(&self, offset: usize) -> Result<u128, LedgerError> {
        let word = self.word(offset)?;
        if word[..16].iter().any(|b| *b != 0) {
            return Err(decode_err("uint256 value exceeds supported range"));
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(low))
    }

    fn uint_saturating(&self, offset: usize) -> Result<u128, LedgerError> {
        let word = self.word(offset)?;
        if word[..16].iter().any(|b| *b != 0) {
            return Ok(u128::MAX);
        }
        self.uint(offset)
    }

    fn u64(&self, offset: usize) -> Result<u64, LedgerError> {
        u64::try_from(self.uint(offset)?).map_err(|_| decode_err("value exceeds u64"))
    }

    fn u8(&self, offset: usize) -> Result<u8, LedgerError> {
        u8::try_from(self.uint(offset)?).map_err(|_| decode_err("value exceeds uint8"))
    }

    fn usize(&self, offset: usize) -> Result<usize, LedgerError> {
        usize::try_from(self.uint(offset)?).map_err(|_| decode_err("offset exceeds usize"))
    }

    fn bool(&self, offset: usize) -> Result<bool, LedgerError> {
        match self.uint(offset)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(decode_err(format!("invalid bool word: {other}"))),
        }
    }

    fn address(&self, offset: usize) -> Result<Address, LedgerError> {
        let word = self.word(offset)?;
        if word[..12].iter().any(|b| *b != 0) {
            return Err(decode_err("address word has dirty high bytes"));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[12..]);
        Ok(Address::from_bytes(bytes))
    }

    fn bytes32(&self, offset: usize) -> Result<EntityId, LedgerError> {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(self.word(offset)?);
        Ok(EntityId::from_bytes(bytes))
    }

    /// String whose offset (relative to `base`) sits at `head`
    fn string(&self, base: usize, head: usize) -> Result<String, LedgerError> {
        let start = base
            .checked_add(self.usize(head)?)
            .ok_or_else(|| decode_err("string offset overflow"))?;
        let len = self.usize(start)?;
        let begin = start + WORD;
        let end = begin
            .checked_add(len)
            .ok_or_else(|| decode_err("string length overflow"))?;
        let bytes = self
            .data
            .get(begin..end)
            .ok_or_else(|| decode_err("string runs past end of data"))?;
        String::from_utf8(bytes.to_vec()).map_err(|e| decode_err(format!("invalid utf-8: {e}")))
    }
}

fn property_at(reader: &Reader<'_>, base: usize) -> Result<RawProperty, LedgerError> {
    let field = |i: usize| base + i * WORD;
    Ok(RawProperty {
        id: reader.bytes32(field(0))?,
        submitter: reader.address(field(1))?,
        country: reader.string(base, field(2))?,
        region: reader.string(base, field(3))?,
        locality: reader.string(base, field(4))?,
        parcel: reader.string(base, field(5))?,
        ipfs_hash: reader.string(base, field(6))?,
        staked_amount: reader.uint(field(7))?,
        last_update_time: reader.u64(field(8))?,
        validated: reader.bool(field(9))?,
        validation_status: reader.u8(field(10))?,
    })
}

/// Return data of `properties(id)`
pub fn decode_property(data: &[u8]) -> Result<RawProperty, LedgerError> {
    property_at(&Reader::new(data), 0)
}

/// Return data of `getPropertiesNeedingValidation()` (a `tuple[]`)
pub fn decode_property_list(data: &[u8]) -> Result<Vec<RawProperty>, LedgerError> {
    let reader = Reader::new(data);
    let array = reader.usize(0)?;
    let count = reader.usize(array)?;
    let elements = array + WORD;

    let mut properties = Vec::with_capacity(count.min(1024));
    for i in 0..count {
        let head = i
            .checked_mul(WORD)
            .and_then(|o| o.checked_add(elements))
            .ok_or_else(|| decode_err("array index overflow"))?;
        let offset = reader.usize(head)?;
        let base = elements
            .checked_add(offset)
            .ok_or_else(|| decode_err("element offset overflow"))?;
        properties.push(property_at(&reader, base)?);
    }
    Ok(properties)
}

/// Return data of `validations(id)`
pub fn decode_validation(data: &[u8]) -> Result<RawValidation, LedgerError> {
    let reader = Reader::new(data);
    Ok(RawValidation {
        property_id: reader.bytes32(0)?,
        fee: reader.uint(WORD)?,
        start_time: reader.u64(2 * WORD)?,
        total_staked: reader.uint(3 * WORD)?,
        positive_stake: reader.uint(4 * WORD)?,
        concluded: reader.bool(5 * WORD)?,
    })
}

/// Return data of `getValidationStake(id, voter)`
pub fn decode_stake(data: &[u8]) -> Result<RawStake, LedgerError> {
    let reader = Reader::new(data);
    Ok(RawStake {
        amount: reader.uint(0)?,
        support: reader.bool(WORD)?,
        claimed: reader.bool(2 * WORD)?,
    })
}

pub fn decode_bool(data: &[u8]) -> Result<bool, LedgerError> {
    Reader::new(data).bool(0)
}

pub fn decode_uint(data: &[u8]) -> Result<u128, LedgerError> {
    Reader::new(data).uint(0)
}

/// Token balance or allowance; an unlimited approval reads as `u128::MAX`
pub fn decode_uint_saturating(data: &[u8]) -> Result<u128, LedgerError> {
    Reader::new(data).uint_saturating(0)
}

/// Message of an `Error(string)` revert payload
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(&ERROR_SELECTOR)?;
    Reader::new(payload).string(0, 0).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::TokenAmount;
    use crate::id::LocationKey;

    fn property_tokens(id: EntityId, status: u8) -> Vec<Token> {
        vec![
            Token::FixedBytes(id),
            Token::Address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap()),
            Token::String("US".into()),
            Token::String("Alabama".into()),
            Token::String("Baldwin County".into()),
            Token::String("1234567890".into()),
            Token::String("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG".into()),
            Token::Uint(TokenAmount::from_tokens(100).raw()),
            Token::Uint(1_700_000_000),
            Token::Bool(false),
            Token::Uint(u128::from(status)),
        ]
    }

    #[test]
    fn test_known_selectors() {
        assert_eq!(hex::encode(selector(signatures::APPROVE)), "095ea7b3");
        assert_eq!(hex::encode(selector(signatures::BALANCE_OF)), "70a08231");
        assert_eq!(hex::encode(selector(signatures::ALLOWANCE)), "dd62ed3e");
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(selector("Error(string)"), ERROR_SELECTOR);
    }

    #[test]
    fn test_encode_approve() {
        let spender: Address = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512".parse().unwrap();
        let data = encode_contract_call(&ContractCall::Approve {
            spender,
            amount: TokenAmount::from_tokens(100),
        });

        assert_eq!(data.len(), 4 + 2 * WORD);
        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(&data[4..16], &[0u8; 12]);
        assert_eq!(&data[16..36], spender.as_bytes());
        assert_eq!(
            hex::encode(&data[36..68]),
            "0000000000000000000000000000000000000000000000056bc75e2d63100000"
        );
    }

    #[test]
    fn test_encode_submit_property_layout() {
        let location = LocationKey::new("US", "Alabama", "Baldwin County", "1234567890");
        let data = encode_contract_call(&ContractCall::SubmitProperty {
            location,
            content_hash: "QmHash".into(),
        });
        let args = &data[4..];
        let reader = Reader::new(args);

        // five string offsets, first tail directly after the head
        assert_eq!(reader.usize(0).unwrap(), 5 * WORD);
        assert_eq!(reader.usize(WORD).unwrap(), 7 * WORD);
        assert_eq!(reader.string(0, 0).unwrap(), "US");
        assert_eq!(reader.string(0, WORD).unwrap(), "Alabama");
        assert_eq!(reader.string(0, 2 * WORD).unwrap(), "Baldwin County");
        assert_eq!(reader.string(0, 3 * WORD).unwrap(), "1234567890");
        assert_eq!(reader.string(0, 4 * WORD).unwrap(), "QmHash");
        // every string fits in one padded word
        assert_eq!(args.len(), 5 * WORD + 5 * 2 * WORD);
    }

    #[test]
    fn test_encode_empty_string() {
        let encoded = encode(&[Token::String(String::new())]);
        assert_eq!(encoded.len(), 2 * WORD);
        assert_eq!(Reader::new(&encoded).string(0, 0).unwrap(), "");
    }

    #[test]
    fn test_encode_vote() {
        let id = LocationKey::new("US", "Alabama", "Baldwin County", "1").entity_id();
        let data = encode_contract_call(&ContractCall::CastValidationVote {
            property_id: id,
            stake: TokenAmount::from_tokens(1),
            support: true,
        });
        assert_eq!(data.len(), 4 + 3 * WORD);
        assert_eq!(&data[4..36], id.as_bytes());
        assert_eq!(data[4 + 3 * WORD - 1], 1);
    }

    #[test]
    fn test_decode_property_getter() {
        let id = LocationKey::new("US", "Alabama", "Baldwin County", "1234567890").entity_id();
        let data = encode(&property_tokens(id, 1));

        let raw = decode_property(&data).unwrap();
        assert_eq!(raw.id, id);
        assert_eq!(raw.locality, "Baldwin County");
        assert_eq!(raw.parcel, "1234567890");
        assert_eq!(raw.staked_amount, TokenAmount::from_tokens(100).raw());
        assert_eq!(raw.last_update_time, 1_700_000_000);
        assert_eq!(raw.validation_status, 1);
    }

    #[test]
    fn test_decode_property_list() {
        let first = LocationKey::new("US", "Alabama", "Baldwin County", "1").entity_id();
        let second = LocationKey::new("US", "Texas", "Travis County", "0001").entity_id();
        let a = encode(&property_tokens(first, 0));
        let b = encode(&property_tokens(second, 1));

        let mut data = Vec::new();
        data.extend_from_slice(&uint_word(WORD as u128));
        data.extend_from_slice(&uint_word(2));
        data.extend_from_slice(&uint_word(2 * WORD as u128));
        data.extend_from_slice(&uint_word((2 * WORD + a.len()) as u128));
        data.extend_from_slice(&a);
        data.extend_from_slice(&b);

        let list = decode_property_list(&data).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, first);
        assert_eq!(list[1].id, second);
        assert_eq!(list[1].validation_status, 1);
    }

    #[test]
    fn test_decode_empty_list() {
        let mut data = Vec::new();
        data.extend_from_slice(&uint_word(WORD as u128));
        data.extend_from_slice(&uint_word(0));
        assert!(decode_property_list(&data).unwrap().is_empty());
    }

    #[test]
    fn test_decode_validation_and_stake() {
        let id = LocationKey::new("CA", "Ontario", "Toronto", "42").entity_id();
        let data = encode(&[
            Token::FixedBytes(id),
            Token::Uint(5),
            Token::Uint(1_700_000_000),
            Token::Uint(300),
            Token::Uint(200),
            Token::Bool(true),
        ]);
        let validation = decode_validation(&data).unwrap();
        assert_eq!(validation.property_id, id);
        assert_eq!(validation.start_time, 1_700_000_000);
        assert!(validation.concluded);

        let stake = decode_stake(&encode(&[Token::Uint(7), Token::Bool(true), Token::Bool(false)]))
            .unwrap();
        assert_eq!(stake.amount, 7);
        assert!(stake.support);
        assert!(!stake.claimed);
    }

    #[test]
    fn test_uint_above_u128_is_rejected() {
        let mut word = [0u8; WORD];
        word[0] = 1;
        assert!(matches!(decode_uint(&word), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_unlimited_allowance_saturates() {
        assert_eq!(decode_uint_saturating(&[0xff; WORD]).unwrap(), u128::MAX);
        assert_eq!(decode_uint_saturating(&uint_word(42)).unwrap(), 42);
        assert!(decode_uint_saturating(&[0xff; 16]).is_err());
    }

    #[test]
    fn test_truncated_data_is_rejected() {
        assert!(decode_bool(&[0u8; 16]).is_err());
        assert!(decode_validation(&[0u8; WORD * 5]).is_err());
        assert!(matches!(decode_bool(&uint_word(2)), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_revert_reason() {
        let mut data = ERROR_SELECTOR.to_vec();
        data.extend_from_slice(&encode(&[Token::String("Insufficient stake".into())]));
        assert_eq!(decode_revert_reason(&data).as_deref(), Some("Insufficient stake"));
        assert_eq!(decode_revert_reason(&[0xde, 0xad, 0xbe, 0xef]), None);
    }
}
