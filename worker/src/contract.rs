// ==============================================================================
// contract.rs - Contract View Adapter
// ==============================================================================
// Description: Typed contract operations over the ABI codec and host client
// Author: Matt Barham
// Created: 2025-11-15
// Modified: 2025-12-02
// Version: 1.1.0
// ==============================================================================

use primitive_types::U256;
use thiserror::Error;
use tracing::debug;

use crate::abi::{self, AbiDecodeError, AbiEncodeError, Token};
use crate::host::{HostError, HostTransport};

/// Lifecycle status of an analysis request, as reported by the contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Completed,
    Failed,
    /// A status string this worker does not recognize
    Unknown(String),
}

impl RequestStatus {
    pub fn from_contract(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "pending" => RequestStatus::Pending,
            "completed" => RequestStatus::Completed,
            "failed" => RequestStatus::Failed,
            _ => RequestStatus::Unknown(raw.to_string()),
        }
    }
}

/// One analysis request record
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub requester: String,
    pub user1: String,
    pub user2: String,
    pub status: RequestStatus,
    /// Result JSON, empty until a terminal submission lands
    pub result: String,
    pub request_time: u64,
    pub completion_time: u64,
}

/// Errors from contract operations
#[derive(Error, Debug)]
pub enum ContractError {
    #[error(transparent)]
    Encode(#[from] AbiEncodeError),

    #[error(transparent)]
    Decode(#[from] AbiDecodeError),

    #[error(transparent)]
    Host(#[from] HostError),

    /// The contract rejected a terminal submission because the request is
    /// no longer pending; the worker treats this as prior success.
    #[error("request no longer pending: {0}")]
    StateRejection(String),
}

impl ContractError {
    /// Transient errors are worth retrying within the per-id budget
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ContractError::Host(
                HostError::Unavailable(_)
                    | HostError::Timeout(_)
                    | HostError::Rpc { .. }
                    | HostError::Protocol(_)
            )
        )
    }
}

/// Does a host rejection message mean "this request already reached a
/// terminal state"?
fn is_state_rejection(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("not pending") || lower.contains("already")
}

/// Typed view of the analysis contract
#[derive(Debug, Clone)]
pub struct ContractClient<T: HostTransport> {
    transport: T,
    address: String,
    gas_limit: u64,
}

impl<T: HostTransport> ContractClient<T> {
    pub fn new(transport: T, address: impl Into<String>, gas_limit: u64) -> Self {
        Self {
            transport,
            address: address.into(),
            gas_limit,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Ids of all requests currently pending at the contract
    pub async fn get_pending_requests(&self) -> Result<Vec<U256>, ContractError> {
        let call = abi::encode_call(&abi::GET_PENDING_REQUESTS, &[])?;
        let raw = self.transport.eth_call(&self.address, &call).await?;
        let mut tokens = abi::decode_return(&abi::GET_PENDING_REQUESTS, &raw)?;
        let ids = take(&mut tokens)?.into_uint256_array()?;
        debug!(pending = ids.len(), "fetched pending request set");
        Ok(ids)
    }

    /// Full request record for one id
    pub async fn get_analysis_request(&self, id: U256) -> Result<AnalysisRequest, ContractError> {
        let call = abi::encode_call(&abi::GET_ANALYSIS_REQUEST, &[Token::Uint256(id)])?;
        let raw = self.transport.eth_call(&self.address, &call).await?;
        let mut tokens = abi::decode_return(&abi::GET_ANALYSIS_REQUEST, &raw)?;

        let requester = format_address(take(&mut tokens)?.into_address()?);
        let user1 = format_address(take(&mut tokens)?.into_address()?);
        let user2 = format_address(take(&mut tokens)?.into_address()?);
        let status = RequestStatus::from_contract(&take(&mut tokens)?.into_string()?);
        let result = take(&mut tokens)?.into_string()?;
        let request_time = take(&mut tokens)?.into_uint256()?.low_u64();
        let completion_time = take(&mut tokens)?.into_uint256()?.low_u64();

        Ok(AnalysisRequest {
            requester,
            user1,
            user2,
            status,
            result,
            request_time,
            completion_time,
        })
    }

    /// Both users' raw SNP datasets for one request
    ///
    /// The contract only answers this from the TEE identity; any other
    /// caller gets a host-level rejection.
    pub async fn get_snp_data(&self, id: U256) -> Result<(String, String), ContractError> {
        let call = abi::encode_call(&abi::GET_SNP_DATA, &[Token::Uint256(id)])?;
        let raw = self.transport.eth_call(&self.address, &call).await?;
        let mut tokens = abi::decode_return(&abi::GET_SNP_DATA, &raw)?;
        let user1 = take(&mut tokens)?.into_string()?;
        let user2 = take(&mut tokens)?.into_string()?;
        Ok((user1, user2))
    }

    /// Submit a successful analysis result
    pub async fn submit_analysis_result(
        &self,
        id: U256,
        result_json: &str,
        confidence_percent: u64,
        relationship: &str,
    ) -> Result<String, ContractError> {
        let call = abi::encode_call(
            &abi::SUBMIT_ANALYSIS_RESULT,
            &[
                Token::Uint256(id),
                Token::String(result_json.to_string()),
                Token::Uint256(U256::from(confidence_percent)),
                Token::String(relationship.to_string()),
            ],
        )?;
        self.submit(call).await
    }

    /// Mark a request failed with a human-readable reason
    pub async fn mark_analysis_failed(&self, id: U256, reason: &str) -> Result<String, ContractError> {
        let call = abi::encode_call(
            &abi::MARK_ANALYSIS_FAILED,
            &[Token::Uint256(id), Token::String(reason.to_string())],
        )?;
        self.submit(call).await
    }

    async fn submit(&self, call: Vec<u8>) -> Result<String, ContractError> {
        match self.transport.submit_tx(&self.address, &call, self.gas_limit).await {
            Ok(hash) => Ok(hash),
            Err(HostError::Rpc { message, .. }) if is_state_rejection(&message) => {
                Err(ContractError::StateRejection(message))
            }
            Err(other) => Err(ContractError::Host(other)),
        }
    }
}

fn format_address(bytes: [u8; 20]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Pop the next decoded token; decode output always matches the schema
/// arity, so exhaustion means the schema and the consumer disagree.
fn take(tokens: &mut Vec<Token>) -> Result<Token, AbiDecodeError> {
    if tokens.is_empty() {
        return Err(AbiDecodeError::Truncated { needed: 1, available: 0 });
    }
    Ok(tokens.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ParamType;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted transport: canned return data per selector, canned submit
    /// behavior, and a call log.
    #[derive(Default)]
    struct MockTransport {
        reads: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
        submit_error: Mutex<Option<HostError>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn script_read(&self, function: &abi::Function, tokens: &[Token]) {
            self.reads
                .lock()
                .unwrap()
                .push((function.selector().to_vec(), abi::encode_values(tokens)));
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HostTransport for MockTransport {
        async fn eth_call(&self, _to: &str, data: &[u8]) -> Result<Vec<u8>, HostError> {
            self.calls.lock().unwrap().push(format!("call:{}", hex::encode(&data[..4])));
            let reads = self.reads.lock().unwrap();
            for (selector, response) in reads.iter() {
                if data.starts_with(selector) {
                    return Ok(response.clone());
                }
            }
            Err(HostError::Rpc { code: -32601, message: "unknown call".to_string() })
        }

        async fn submit_tx(&self, _to: &str, data: &[u8], _gas: u64) -> Result<String, HostError> {
            self.calls.lock().unwrap().push(format!("submit:{}", hex::encode(&data[..4])));
            match self.submit_error.lock().unwrap().take() {
                Some(err) => Err(err),
                None => Ok("0xhash".to_string()),
            }
        }
    }

    fn client(transport: MockTransport) -> ContractClient<MockTransport> {
        ContractClient::new(transport, "0x614b1b0dc3c94dc79f4df6e180baf8ed5c81bec3", 800_000)
    }

    #[tokio::test]
    async fn test_get_pending_requests_decodes_ids() {
        let transport = MockTransport::default();
        transport.script_read(
            &abi::GET_PENDING_REQUESTS,
            &[Token::Uint256Array(vec![U256::from(1), U256::from(7)])],
        );
        let client = client(transport);

        let ids = client.get_pending_requests().await.unwrap();
        assert_eq!(ids, vec![U256::from(1), U256::from(7)]);
    }

    #[tokio::test]
    async fn test_get_analysis_request_parses_record() {
        let transport = MockTransport::default();
        transport.script_read(
            &abi::GET_ANALYSIS_REQUEST,
            &[
                Token::Address([0x11; 20]),
                Token::Address([0x22; 20]),
                Token::Address([0x33; 20]),
                Token::String("Pending".to_string()),
                Token::String(String::new()),
                Token::Uint256(U256::from(1_700_000_000u64)),
                Token::Uint256(U256::zero()),
            ],
        );
        let client = client(transport);

        let request = client.get_analysis_request(U256::from(3)).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.requester, format!("0x{}", "11".repeat(20)));
        assert_eq!(request.result, "");
        assert_eq!(request.request_time, 1_700_000_000);
        assert_eq!(request.completion_time, 0);
    }

    #[tokio::test]
    async fn test_get_snp_data_returns_both_strings() {
        let transport = MockTransport::default();
        transport.script_read(
            &abi::GET_SNP_DATA,
            &[
                Token::String("rs1 1 1000 AA".to_string()),
                Token::String("rs1 1 1000 AG".to_string()),
            ],
        );
        let client = client(transport);

        let (user1, user2) = client.get_snp_data(U256::from(3)).await.unwrap();
        assert_eq!(user1, "rs1 1 1000 AA");
        assert_eq!(user2, "rs1 1 1000 AG");
    }

    #[tokio::test]
    async fn test_submit_maps_not_pending_to_state_rejection() {
        let transport = MockTransport::default();
        *transport.submit_error.lock().unwrap() = Some(HostError::Rpc {
            code: -32000,
            message: "Request not pending".to_string(),
        });
        let client = client(transport);

        let err = client
            .submit_analysis_result(U256::from(3), "{}", 80, "first cousins")
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::StateRejection(_)));
    }

    #[tokio::test]
    async fn test_submit_passes_other_rpc_errors_through() {
        let transport = MockTransport::default();
        *transport.submit_error.lock().unwrap() = Some(HostError::Rpc {
            code: -32603,
            message: "out of gas".to_string(),
        });
        let client = client(transport);

        let err = client
            .mark_analysis_failed(U256::from(3), "fetch failed")
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::Host(HostError::Rpc { .. })));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_already_completed_is_state_rejection() {
        let transport = MockTransport::default();
        *transport.submit_error.lock().unwrap() = Some(HostError::Rpc {
            code: -32000,
            message: "analysis already completed".to_string(),
        });
        let client = client(transport);

        let err = client
            .mark_analysis_failed(U256::from(3), "reason")
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::StateRejection(_)));
    }

    #[tokio::test]
    async fn test_truncated_return_is_decode_error() {
        let transport = MockTransport::default();
        transport
            .reads
            .lock()
            .unwrap()
            .push((abi::GET_SNP_DATA.selector().to_vec(), vec![0u8; 16]));
        let client = client(transport);

        let err = client.get_snp_data(U256::from(1)).await.unwrap_err();
        assert!(matches!(err, ContractError::Decode(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_call_data_carries_selector() {
        let transport = MockTransport::default();
        transport.script_read(&abi::GET_PENDING_REQUESTS, &[Token::Uint256Array(vec![])]);
        let client = client(transport);
        client.get_pending_requests().await.unwrap();

        let calls = client.transport.calls();
        assert_eq!(calls, vec![format!("call:{}", hex::encode(abi::GET_PENDING_REQUESTS.selector()))]);
    }

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(RequestStatus::from_contract("PENDING"), RequestStatus::Pending);
        assert_eq!(RequestStatus::from_contract("completed"), RequestStatus::Completed);
        assert_eq!(RequestStatus::from_contract("Failed"), RequestStatus::Failed);
        assert_eq!(
            RequestStatus::from_contract("archived"),
            RequestStatus::Unknown("archived".to_string())
        );
    }

    // take() consumes tokens front to back; keep a guard so schema edits
    // fail loudly here rather than at runtime
    #[test]
    fn test_analysis_request_schema_arity() {
        assert_eq!(abi::GET_ANALYSIS_REQUEST.outputs.len(), 7);
        assert_eq!(abi::GET_ANALYSIS_REQUEST.outputs[3], ParamType::String);
    }
}
