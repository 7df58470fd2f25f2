//! Grouping of streamed scan records by SSID

use futures::{Stream, StreamExt, stream::BoxStream};

use crate::core::types::{ScanRecord, ScanRecordGroup};

/// Incremental scan result aggregation
///
/// Records are grouped by raw SSID bytes; within a group the channel is the
/// identity, so a newer record for a known channel replaces the old one. A
/// group's auth mode follows its strongest member, so a transition-mode AP
/// advertising WPA2 and WPA3 under one name stays a single network.
/// A push costs `O(g + m log m)` for `g` groups and `m` members of the
/// touched group; scans return tens of entries.
#[derive(Debug, Default)]
pub struct ScanAggregator {
    groups: Vec<ScanRecordGroup>,
}

impl ScanAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record in and return the current snapshot
    ///
    /// Records without info or with an unresolved auth mode are ignored.
    pub fn push(&mut self, record: ScanRecord) -> &[ScanRecordGroup] {
        let Some(info) = record.wifi_info.as_ref() else {
            return &self.groups;
        };
        let Some(auth_mode) = info.auth_mode else {
            return &self.groups;
        };
        let channel = info.channel;

        let index = match self.groups.iter().position(|g| g.ssid == info.ssid) {
            Some(index) => index,
            None => {
                self.groups.push(ScanRecordGroup {
                    ssid: info.ssid.clone(),
                    auth_mode,
                    members: vec![],
                });
                self.groups.len() - 1
            }
        };

        let group = &mut self.groups[index];
        match group
            .members
            .iter()
            .position(|m| m.channel() == Some(channel))
        {
            Some(existing) => group.members[existing] = record,
            None => group.members.push(record),
        }
        // None sorts below any reading
        group.members.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        if let Some(best) = group.members.first().and_then(ScanRecord::auth_mode) {
            group.auth_mode = best;
        }

        &self.groups
    }

    /// Groups in first-seen order
    pub fn groups(&self) -> &[ScanRecordGroup] {
        &self.groups
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }

    pub fn into_groups(self) -> Vec<ScanRecordGroup> {
        self.groups
    }
}

/// Turn a record stream into a stream of aggregated snapshots
///
/// A snapshot follows every record; ignored records repeat the last one.
pub fn aggregate<S>(records: S) -> BoxStream<'static, Vec<ScanRecordGroup>>
where
    S: Stream<Item = ScanRecord> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut aggregator = ScanAggregator::new();
        let mut records = Box::pin(records);
        while let Some(record) = records.next().await {
            yield aggregator.push(record).to_vec();
        }
    })
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::core::types::{AuthMode, WifiInfo};

    fn record(ssid: &str, auth_mode: Option<AuthMode>, channel: u32, rssi: Option<i32>) -> ScanRecord {
        ScanRecord {
            wifi_info: Some(WifiInfo {
                channel,
                ..WifiInfo::new(ssid, auth_mode).unwrap()
            }),
            rssi,
        }
    }

    #[test]
    fn test_groups_by_ssid_and_sorts_by_rssi() {
        let mut aggregator = ScanAggregator::new();
        aggregator.push(record("Home", Some(AuthMode::Wpa2Psk), 1, Some(-70)));
        aggregator.push(record("Office", Some(AuthMode::Wpa2Psk), 6, Some(-50)));
        let groups = aggregator.push(record("Home", Some(AuthMode::Wpa2Psk), 36, Some(-45)));

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].ssid, b"Home");
        assert_eq!(groups[0].channels(), vec![36, 1]);
        assert_eq!(groups[0].best().unwrap().rssi, Some(-45));
        assert_eq!(groups[1].ssid, b"Office");
    }

    #[test]
    fn test_same_channel_replaces_member() {
        let mut aggregator = ScanAggregator::new();
        aggregator.push(record("Home", Some(AuthMode::Wpa2Psk), 6, Some(-80)));
        let groups = aggregator.push(record("Home", Some(AuthMode::Wpa2Psk), 6, Some(-55)));

        assert_eq!(groups[0].members.len(), 1);
        assert_eq!(groups[0].members[0].rssi, Some(-55));
    }

    #[test]
    fn test_unresolved_auth_and_empty_records_ignored() {
        let mut aggregator = ScanAggregator::new();
        aggregator.push(record("Hidden", None, 1, Some(-40)));
        aggregator.push(ScanRecord::default());
        assert!(aggregator.groups().is_empty());
    }

    #[test]
    fn test_same_ssid_with_mixed_auth_is_one_group() {
        let mut aggregator = ScanAggregator::new();
        aggregator.push(record("Home", Some(AuthMode::Wpa2Psk), 1, Some(-60)));
        let groups = aggregator.push(record("Home", Some(AuthMode::Wpa3Psk), 36, Some(-45)));

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].auth_mode, AuthMode::Wpa3Psk);
        assert_eq!(
            groups[0].members[1].auth_mode(),
            Some(AuthMode::Wpa2Psk)
        );
    }

    #[test]
    fn test_same_record_twice_is_idempotent() {
        let mut aggregator = ScanAggregator::new();
        let once = aggregator
            .push(record("Home", Some(AuthMode::Wpa2Psk), 6, Some(-70)))
            .to_vec();
        let twice = aggregator
            .push(record("Home", Some(AuthMode::Wpa2Psk), 6, Some(-70)))
            .to_vec();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_non_utf8_ssids_kept_apart() {
        let raw = |ssid: &[u8]| ScanRecord {
            wifi_info: Some(WifiInfo::new(ssid, Some(AuthMode::Wpa2Psk)).unwrap()),
            rssi: Some(-50),
        };
        let mut aggregator = ScanAggregator::new();
        aggregator.push(raw(&[0xc4, 0xe3, 0xba, 0xc3]));
        let groups = aggregator.push(raw(&[0xff, 0xfe]));

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].ssid, vec![0xc4, 0xe3, 0xba, 0xc3]);
        assert_eq!(groups[1].ssid, vec![0xff, 0xfe]);
    }

    #[test]
    fn test_missing_rssi_sorts_last() {
        let mut aggregator = ScanAggregator::new();
        aggregator.push(record("Home", Some(AuthMode::Wpa2Psk), 1, None));
        let groups = aggregator.push(record("Home", Some(AuthMode::Wpa2Psk), 6, Some(-90)));
        assert_eq!(groups[0].channels(), vec![6, 1]);
    }

    #[tokio::test]
    async fn test_stream_emits_snapshot_per_record() {
        let records = stream::iter(vec![
            record("Home", Some(AuthMode::Wpa2Psk), 1, Some(-70)),
            ScanRecord::default(),
            record("Home", Some(AuthMode::Wpa2Psk), 11, Some(-60)),
        ]);

        let snapshots: Vec<_> = aggregate(records).collect().await;
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0], snapshots[1]);
        assert_eq!(snapshots[2][0].channels(), vec![11, 1]);
    }
}
