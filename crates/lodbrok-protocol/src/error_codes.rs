//! Kafka protocol error code registry.
//!
//! Standard error codes from the Kafka protocol specification.
//! See: https://kafka.apache.org/protocol#protocol_error_codes
//!
//! The registry is a fixed 56-entry table built at compile time; index 0 is
//! reserved for code -1 ("unknown server error") and index N holds code N for
//! 1..=55. Codes outside the table resolve to a placeholder descriptor
//! rather than failing decode.

use lodbrok_common::{BrokerError, Result};

const fn entry(code: i16, name: &'static str, description: &'static str) -> BrokerError {
    BrokerError {
        code,
        name,
        description,
    }
}

/// All known broker error descriptors. Index 0 carries code -1.
pub static ALL_ERRORS: [BrokerError; 56] = [
    entry(-1, "UNKNOWN", "The server experienced an unexpected error when processing the request."),
    entry(1, "OFFSET_OUT_OF_RANGE", "The requested offset is not within the range of offsets maintained by the server."),
    entry(2, "CORRUPT_MESSAGE", "This message has failed its CRC checksum, exceeds the valid size, or is otherwise corrupt."),
    entry(3, "UNKNOWN_TOPIC_OR_PARTITION", "This server does not host this topic-partition."),
    entry(4, "INVALID_FETCH_SIZE", "The requested fetch size is invalid."),
    entry(5, "LEADER_NOT_AVAILABLE", "There is no leader for this topic-partition as we are in the middle of a leadership election."),
    entry(6, "NOT_LEADER_FOR_PARTITION", "This server is not the leader for that topic-partition."),
    entry(7, "REQUEST_TIMED_OUT", "The request timed out."),
    entry(8, "BROKER_NOT_AVAILABLE", "The broker is not available."),
    entry(9, "REPLICA_NOT_AVAILABLE", "The replica is not available for the requested topic-partition."),
    entry(10, "MESSAGE_TOO_LARGE", "The request included a message larger than the max message size the server will accept."),
    entry(11, "STALE_CONTROLLER_EPOCH", "The controller moved to another broker."),
    entry(12, "OFFSET_METADATA_TOO_LARGE", "The metadata field of the offset request was too large."),
    entry(13, "NETWORK_EXCEPTION", "The server disconnected before a response was received."),
    entry(14, "COORDINATOR_LOAD_IN_PROGRESS", "The coordinator is loading and hence can't process requests."),
    entry(15, "COORDINATOR_NOT_AVAILABLE", "The coordinator is not available."),
    entry(16, "NOT_COORDINATOR", "This is not the correct coordinator."),
    entry(17, "INVALID_TOPIC_EXCEPTION", "The request attempted to perform an operation on an invalid topic."),
    entry(18, "RECORD_LIST_TOO_LARGE", "The request included message batch larger than the configured segment size on the server."),
    entry(19, "NOT_ENOUGH_REPLICAS", "Messages are rejected since there are fewer in-sync replicas than required."),
    entry(20, "NOT_ENOUGH_REPLICAS_AFTER_APPEND", "Messages are written to the log, but to fewer in-sync replicas than required."),
    entry(21, "INVALID_REQUIRED_ACKS", "Produce request specified an invalid value for required acks."),
    entry(22, "ILLEGAL_GENERATION", "Specified group generation id is not valid."),
    entry(23, "INCONSISTENT_GROUP_PROTOCOL", "The group member's supported protocols are incompatible with those of existing members or first group member tried to join with empty protocol type or empty protocol list."),
    entry(24, "INVALID_GROUP_ID", "The configured groupId is invalid."),
    entry(25, "UNKNOWN_MEMBER_ID", "The coordinator is not aware of this member."),
    entry(26, "INVALID_SESSION_TIMEOUT", "The session timeout is not within the range allowed by the broker (as configured by group.min.session.timeout.ms and group.max.session.timeout.ms)."),
    entry(27, "REBALANCE_IN_PROGRESS", "The group is rebalancing, so a rejoin is needed."),
    entry(28, "INVALID_COMMIT_OFFSET_SIZE", "The committing offset data size is not valid."),
    entry(29, "TOPIC_AUTHORIZATION_FAILED", "Topic authorization failed."),
    entry(30, "GROUP_AUTHORIZATION_FAILED", "Group authorization failed."),
    entry(31, "CLUSTER_AUTHORIZATION_FAILED", "Cluster authorization failed."),
    entry(32, "INVALID_TIMESTAMP", "The timestamp of the message is out of acceptable range."),
    entry(33, "UNSUPPORTED_SASL_MECHANISM", "The broker does not support the requested SASL mechanism."),
    entry(34, "ILLEGAL_SASL_STATE", "Request is not valid given the current SASL state."),
    entry(35, "UNSUPPORTED_VERSION", "The version of API is not supported."),
    entry(36, "TOPIC_ALREADY_EXISTS", "Topic with this name already exists."),
    entry(37, "INVALID_PARTITIONS", "Number of partitions is below 1."),
    entry(38, "INVALID_REPLICATION_FACTOR", "Replication factor is below 1 or larger than the number of available brokers."),
    entry(39, "INVALID_REPLICA_ASSIGNMENT", "Replica assignment is invalid."),
    entry(40, "INVALID_CONFIG", "Configuration is invalid."),
    entry(41, "NOT_CONTROLLER", "This is not the correct controller for this cluster."),
    entry(42, "INVALID_REQUEST", "This most likely occurs because of a request being malformed by the client library or the message was sent to an incompatible broker."),
    entry(43, "UNSUPPORTED_FOR_MESSAGE_FORMAT", "The message format version on the broker does not support the request."),
    entry(44, "POLICY_VIOLATION", "Request parameters do not satisfy the configured policy."),
    entry(45, "OUT_OF_ORDER_SEQUENCE_NUMBER", "The broker received an out of order sequence number."),
    entry(46, "DUPLICATE_SEQUENCE_NUMBER", "The broker received a duplicate sequence number."),
    entry(47, "INVALID_PRODUCER_EPOCH", "Producer attempted an operation with an old epoch."),
    entry(48, "INVALID_TXN_STATE", "The producer attempted a transactional operation in an invalid state."),
    entry(49, "INVALID_PRODUCER_ID_MAPPING", "The producer attempted to use a producer id which is not currently assigned to its transactional id."),
    entry(50, "INVALID_TRANSACTION_TIMEOUT", "The transaction timeout is larger than the maximum value allowed by the broker."),
    entry(51, "CONCURRENT_TRANSACTIONS", "The producer attempted to update a transaction while another concurrent operation on the same transaction was ongoing."),
    entry(52, "TRANSACTION_COORDINATOR_FENCED", "Indicates that the transaction coordinator sending a WriteTxnMarker is no longer the current coordinator for a given producer."),
    entry(53, "TRANSACTIONAL_ID_AUTHORIZATION_FAILED", "Transactional Id authorization failed."),
    entry(54, "SECURITY_DISABLED", "Security features are disabled."),
    entry(55, "OPERATION_NOT_ATTEMPTED", "The broker did not attempt to execute this operation."),
];

const UNKNOWN_CODE_NAME: &str = "UNKNOWN_ERROR_CODE";
const UNKNOWN_CODE_DESCRIPTION: &str = "Error code not recognized by this client.";

/// Look up the descriptor for a non-zero error code.
///
/// Returns `None` for code 0 (no error). Codes outside the table produce a
/// placeholder descriptor carrying the original code.
pub fn broker_error(code: i16) -> Option<BrokerError> {
    match code {
        0 => None,
        -1 => Some(ALL_ERRORS[0]),
        1..=55 => Some(ALL_ERRORS[code as usize]),
        _ => Some(BrokerError {
            code,
            name: UNKNOWN_CODE_NAME,
            description: UNKNOWN_CODE_DESCRIPTION,
        }),
    }
}

/// Translate a response error code into a typed error, `Ok(())` for code 0.
pub fn check_error_code(code: i16) -> Result<()> {
    match broker_error(code) {
        None => Ok(()),
        Some(err) => Err(err.into()),
    }
}
