//! Partition assignment strategies.
//!
//! Only the group leader runs an assignment; followers receive the result
//! verbatim through SyncGroup, so a strategy must be deterministic for a
//! given member set and topic metadata.

use std::collections::BTreeMap;

use lodbrok_protocol::join_group_types::JoinGroupResponseMember;
use lodbrok_protocol::metadata_types::TopicMetadata;
use lodbrok_protocol::sync_group_types::{
    MemberAssignment, PartitionAssignment, SyncGroupRequestAssignment,
};

/// A pure mapping from group members and topic metadata to a partition
/// assignment.
pub trait AssignmentStrategy: Send + Sync {
    /// Protocol name advertised in JoinGroup requests.
    fn name(&self) -> &'static str;

    /// Compute the assignment for every member.
    fn assign(
        &self,
        members: &[JoinGroupResponseMember],
        topics: &[TopicMetadata],
    ) -> Vec<SyncGroupRequestAssignment>;
}

/// Range assignment: for each topic independently, split the sorted
/// partition id space into contiguous ranges, one per member in member-id
/// order. With `r = partitions % members`, the first `r` members each take
/// one extra partition.
#[derive(Debug, Default)]
pub struct RangeAssignmentStrategy;

impl AssignmentStrategy for RangeAssignmentStrategy {
    fn name(&self) -> &'static str {
        "range"
    }

    fn assign(
        &self,
        members: &[JoinGroupResponseMember],
        topics: &[TopicMetadata],
    ) -> Vec<SyncGroupRequestAssignment> {
        // Lexical member order is the contract that keeps leaders of
        // successive generations agreeing on the same split.
        let mut member_ids: Vec<&str> = members.iter().map(|m| m.member_id.as_str()).collect();
        member_ids.sort_unstable();
        member_ids.dedup();
        if member_ids.is_empty() {
            return Vec::new();
        }

        let mut per_member: BTreeMap<&str, Vec<PartitionAssignment>> =
            member_ids.iter().map(|id| (*id, Vec::new())).collect();

        for topic in topics {
            let mut partitions: Vec<i32> =
                topic.partitions.iter().map(|p| p.partition).collect();
            partitions.sort_unstable();

            let base = partitions.len() / member_ids.len();
            let extra = partitions.len() % member_ids.len();
            let mut cursor = 0usize;
            for (index, member_id) in member_ids.iter().enumerate() {
                let take = base + usize::from(index < extra);
                if take == 0 {
                    continue;
                }
                let range = partitions[cursor..cursor + take].to_vec();
                cursor += take;
                per_member
                    .get_mut(member_id)
                    .expect("member seeded above")
                    .push(PartitionAssignment {
                        topic: topic.topic.clone(),
                        partitions: range,
                    });
            }
        }

        member_ids
            .iter()
            .map(|member_id| SyncGroupRequestAssignment {
                member_id: member_id.to_string(),
                assignment: MemberAssignment::new(
                    per_member.remove(member_id).unwrap_or_default(),
                )
                .to_bytes(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use lodbrok_protocol::metadata_types::PartitionMetadata;
    use proptest::prelude::*;

    fn members(ids: &[&str]) -> Vec<JoinGroupResponseMember> {
        ids.iter()
            .map(|id| JoinGroupResponseMember {
                member_id: id.to_string(),
                metadata: Bytes::new(),
            })
            .collect()
    }

    fn topic(name: &str, partition_count: i32) -> TopicMetadata {
        TopicMetadata {
            error_code: 0,
            topic: name.to_string(),
            partitions: (0..partition_count)
                .map(|partition| PartitionMetadata {
                    error_code: 0,
                    partition,
                    leader: 0,
                    replicas: vec![0],
                    isr: vec![0],
                })
                .collect(),
        }
    }

    fn decode(assignments: &[SyncGroupRequestAssignment]) -> Vec<(String, Vec<PartitionAssignment>)> {
        assignments
            .iter()
            .map(|a| {
                (
                    a.member_id.clone(),
                    MemberAssignment::from_bytes(&a.assignment)
                        .unwrap()
                        .assignments,
                )
            })
            .collect()
    }

    #[test]
    fn test_even_split() {
        let assignments = RangeAssignmentStrategy.assign(&members(&["a", "b"]), &[topic("t", 4)]);
        let decoded = decode(&assignments);
        assert_eq!(decoded[0].0, "a");
        assert_eq!(decoded[0].1[0].partitions, vec![0, 1]);
        assert_eq!(decoded[1].0, "b");
        assert_eq!(decoded[1].1[0].partitions, vec![2, 3]);
    }

    #[test]
    fn test_remainder_goes_to_first_members() {
        let assignments =
            RangeAssignmentStrategy.assign(&members(&["c", "a", "b"]), &[topic("t", 7)]);
        let decoded = decode(&assignments);
        // Sorted order: a, b, c with 7 = 3*2+1 partitions.
        assert_eq!(decoded[0].1[0].partitions, vec![0, 1, 2]);
        assert_eq!(decoded[1].1[0].partitions, vec![3, 4]);
        assert_eq!(decoded[2].1[0].partitions, vec![5, 6]);
    }

    #[test]
    fn test_more_members_than_partitions() {
        let assignments =
            RangeAssignmentStrategy.assign(&members(&["a", "b", "c"]), &[topic("t", 2)]);
        let decoded = decode(&assignments);
        assert_eq!(decoded[0].1[0].partitions, vec![0]);
        assert_eq!(decoded[1].1[0].partitions, vec![1]);
        assert!(decoded[2].1.is_empty());
    }

    #[test]
    fn test_each_topic_split_independently() {
        let assignments = RangeAssignmentStrategy
            .assign(&members(&["a", "b"]), &[topic("t1", 3), topic("t2", 1)]);
        let decoded = decode(&assignments);
        assert_eq!(decoded[0].1[0].partitions, vec![0, 1]); // t1
        assert_eq!(decoded[0].1[1].partitions, vec![0]); // t2
        assert_eq!(decoded[1].1[0].partitions, vec![2]); // t1 only
        assert_eq!(decoded[1].1.len(), 1);
    }

    proptest! {
        /// Every partition is assigned exactly once and the per-member
        /// counts differ by at most one.
        #[test]
        fn prop_coverage_and_balance(member_count in 1usize..8, partition_count in 0i32..40) {
            let ids: Vec<String> = (0..member_count).map(|i| format!("m{:02}", i)).collect();
            let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            let assignments =
                RangeAssignmentStrategy.assign(&members(&id_refs), &[topic("t", partition_count)]);
            prop_assert_eq!(assignments.len(), member_count);

            let mut seen = Vec::new();
            let mut counts = Vec::new();
            for (_, topics) in decode(&assignments) {
                let mut count = 0usize;
                for assignment in topics {
                    count += assignment.partitions.len();
                    seen.extend(assignment.partitions);
                }
                counts.push(count);
            }

            seen.sort_unstable();
            let expected: Vec<i32> = (0..partition_count).collect();
            prop_assert_eq!(seen, expected);

            let max = counts.iter().copied().max().unwrap_or(0);
            let min = counts.iter().copied().min().unwrap_or(0);
            prop_assert!(max - min <= 1);
        }
    }
}
