//! Grouping of per-process samples by process name
//!
//! Groups keep their identity across ticks (and with it the presentation
//! flags a consumer attached to them) while their instance list is replaced
//! wholesale every tick.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::process::ProcessSample;

/// Sort direction indicator shown next to a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortIndicator {
    #[default]
    None,
    Ascending,
    Descending,
}

impl SortIndicator {
    /// Descending first, then flip on every repeat
    fn toggled(self) -> Self {
        match self {
            SortIndicator::Descending => SortIndicator::Ascending,
            _ => SortIndicator::Descending,
        }
    }
}

/// All running instances of one executable name
#[derive(Debug, Clone)]
pub struct ProcessGroup {
    pub name: String,
    pub instances: Vec<ProcessSample>,
    pub total_download: f64,
    pub total_upload: f64,
    pub expanded: bool,
    pub download_sort: SortIndicator,
    pub upload_sort: SortIndicator,
}

impl ProcessGroup {
    pub fn new(name: String) -> Self {
        Self {
            name,
            instances: Vec::new(),
            total_download: 0.0,
            total_upload: 0.0,
            expanded: false,
            download_sort: SortIndicator::None,
            upload_sort: SortIndicator::None,
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Swap in this tick's instances, keeping the active instance ordering
    fn replace_instances(&mut self, instances: Vec<ProcessSample>) {
        self.instances = instances;
        self.recompute_totals();

        if self.download_sort != SortIndicator::None {
            sort_samples(&mut self.instances, by_download, self.download_sort);
        } else if self.upload_sort != SortIndicator::None {
            sort_samples(&mut self.instances, by_upload, self.upload_sort);
        }
    }

    fn recompute_totals(&mut self) {
        self.total_download = self.instances.iter().map(by_download).sum();
        self.total_upload = self.instances.iter().map(by_upload).sum();
    }

    pub fn sort_instances_by_download(&mut self) {
        self.download_sort = self.download_sort.toggled();
        self.upload_sort = SortIndicator::None;
        sort_samples(&mut self.instances, by_download, self.download_sort);
    }

    pub fn sort_instances_by_upload(&mut self) {
        self.upload_sort = self.upload_sort.toggled();
        self.download_sort = SortIndicator::None;
        sort_samples(&mut self.instances, by_upload, self.upload_sort);
    }

    pub fn toggle_expanded(&mut self) {
        self.expanded = !self.expanded;
    }
}

fn by_download(sample: &ProcessSample) -> f64 {
    sample.download_bytes_per_sec
}

fn by_upload(sample: &ProcessSample) -> f64 {
    sample.upload_bytes_per_sec
}

fn sort_samples(
    samples: &mut [ProcessSample],
    key: fn(&ProcessSample) -> f64,
    order: SortIndicator,
) {
    match order {
        SortIndicator::Ascending => samples.sort_by(|a, b| cmp_f64(key(a), key(b))),
        SortIndicator::Descending => samples.sort_by(|a, b| cmp_f64(key(b), key(a))),
        SortIndicator::None => {}
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Column the group list is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSortKey {
    Name,
    Download,
    Upload,
}

/// Current group-list ordering; re-selecting a column flips its direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupSortState {
    pub key: Option<GroupSortKey>,
    pub descending: bool,
}

impl GroupSortState {
    pub fn select(&mut self, key: GroupSortKey) {
        if self.key == Some(key) {
            self.descending = !self.descending;
        } else {
            self.key = Some(key);
            self.descending = true;
        }
    }

    pub fn indicator_for(&self, key: GroupSortKey) -> SortIndicator {
        match self.key {
            Some(k) if k == key && self.descending => SortIndicator::Descending,
            Some(k) if k == key => SortIndicator::Ascending,
            _ => SortIndicator::None,
        }
    }
}

/// Number of distinct applications and of process instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupSummary {
    pub apps: usize,
    pub processes: usize,
}

#[derive(Debug, Default)]
pub struct ProcessGroupAggregator {
    groups: Vec<ProcessGroup>,
    sort: GroupSortState,
}

impl ProcessGroupAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(&self) -> &[ProcessGroup] {
        &self.groups
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut ProcessGroup> {
        self.groups.iter_mut().find(|g| g.name == name)
    }

    pub fn sort_state(&self) -> GroupSortState {
        self.sort
    }

    /// Fold one tick of samples into the group list
    pub fn apply_tick(&mut self, samples: Vec<ProcessSample>) {
        let mut by_name: HashMap<String, Vec<ProcessSample>> = HashMap::new();
        // First-seen order for groups created this tick
        let mut order: Vec<String> = Vec::new();

        for sample in samples {
            by_name
                .entry(sample.name.clone())
                .or_insert_with(|| {
                    order.push(sample.name.clone());
                    Vec::new()
                })
                .push(sample);
        }

        self.groups.retain(|g| by_name.contains_key(&g.name));

        for group in &mut self.groups {
            if let Some(instances) = by_name.remove(&group.name) {
                group.replace_instances(instances);
            }
        }

        for name in order {
            if let Some(instances) = by_name.remove(&name) {
                let mut group = ProcessGroup::new(name);
                group.replace_instances(instances);
                self.groups.push(group);
            }
        }

        log::debug!(
            "Applied process tick: {} groups, {} processes",
            self.groups.len(),
            self.summary().processes
        );
    }

    /// Order the group list by `key`, toggling direction if it is already active
    pub fn sort_by(&mut self, key: GroupSortKey) {
        self.sort.select(key);
        self.apply_sort();
    }

    /// Re-apply the current ordering, e.g. after totals changed
    pub fn apply_sort(&mut self) {
        let Some(key) = self.sort.key else {
            return;
        };

        self.groups.sort_by(|a, b| {
            let ord = match key {
                GroupSortKey::Name => a.name.cmp(&b.name),
                GroupSortKey::Download => cmp_f64(a.total_download, b.total_download),
                GroupSortKey::Upload => cmp_f64(a.total_upload, b.total_upload),
            };
            if self.sort.descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }

    pub fn summary(&self) -> GroupSummary {
        GroupSummary {
            apps: self.groups.len(),
            processes: self.groups.iter().map(|g| g.instance_count()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pid: i32, name: &str, down: f64, up: f64) -> ProcessSample {
        ProcessSample {
            pid,
            name: name.to_string(),
            download_bytes_per_sec: down,
            upload_bytes_per_sec: up,
        }
    }

    fn names(agg: &ProcessGroupAggregator) -> Vec<&str> {
        agg.groups().iter().map(|g| g.name.as_str()).collect()
    }

    #[test]
    fn test_totals_equal_instance_sum() {
        let mut agg = ProcessGroupAggregator::new();
        agg.apply_tick(vec![
            sample(1, "firefox", 100.0, 10.0),
            sample(2, "firefox", 50.0, 5.0),
            sample(3, "code", 7.0, 3.0),
        ]);

        let firefox = &agg.groups()[0];
        assert_eq!(firefox.name, "firefox");
        assert_eq!(firefox.instance_count(), 2);
        assert_eq!(firefox.total_download, 150.0);
        assert_eq!(firefox.total_upload, 15.0);
        let summary = agg.summary();
        assert_eq!((summary.apps, summary.processes), (2, 3));
    }

    #[test]
    fn test_absent_group_removed_and_new_group_created_once() {
        let mut agg = ProcessGroupAggregator::new();
        let tick = vec![sample(1, "firefox", 1.0, 1.0), sample(2, "code", 1.0, 1.0)];
        agg.apply_tick(tick);
        agg.apply_tick(vec![
            sample(1, "firefox", 2.0, 2.0),
            sample(3, "steam", 1.0, 1.0),
            sample(4, "steam", 1.0, 1.0),
        ]);

        assert_eq!(names(&agg), ["firefox", "steam"]);
        assert_eq!(agg.groups()[1].instance_count(), 2);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut agg = ProcessGroupAggregator::new();
        let tick = vec![sample(1, "Code", 1.0, 0.0), sample(2, "code", 1.0, 0.0)];
        agg.apply_tick(tick);
        assert_eq!(agg.summary().apps, 2);
    }

    #[test]
    fn test_group_state_survives_instance_replacement() {
        let mut agg = ProcessGroupAggregator::new();
        agg.apply_tick(vec![
            sample(1, "firefox", 1.0, 1.0),
            sample(2, "firefox", 9.0, 1.0),
        ]);

        let group = agg.group_mut("firefox").unwrap();
        group.toggle_expanded();
        group.sort_instances_by_download();

        agg.apply_tick(vec![
            sample(1, "firefox", 5.0, 0.0),
            sample(2, "firefox", 3.0, 0.0),
            sample(5, "firefox", 8.0, 0.0),
        ]);

        let group = &agg.groups()[0];
        assert!(group.expanded);
        assert_eq!(group.download_sort, SortIndicator::Descending);
        let pids: Vec<i32> = group.instances.iter().map(|i| i.pid).collect();
        assert_eq!(pids, [5, 1, 2]);
        assert_eq!(group.total_download, 16.0);
    }

    #[test]
    fn test_instance_sort_toggles_and_resets_other_key() {
        let mut group = ProcessGroup::new("chrome".to_string());
        group.replace_instances(vec![
            sample(1, "chrome", 1.0, 30.0),
            sample(2, "chrome", 3.0, 10.0),
            sample(3, "chrome", 2.0, 20.0),
        ]);

        group.sort_instances_by_download();
        assert_eq!(group.download_sort, SortIndicator::Descending);
        assert_eq!(group.instances[0].pid, 2);

        group.sort_instances_by_download();
        assert_eq!(group.download_sort, SortIndicator::Ascending);
        assert_eq!(group.instances[0].pid, 1);

        group.sort_instances_by_upload();
        assert_eq!(group.upload_sort, SortIndicator::Descending);
        assert_eq!(group.download_sort, SortIndicator::None);
        assert_eq!(group.instances[0].pid, 1);
    }

    #[test]
    fn test_group_sort_toggles_on_same_key() {
        let mut agg = ProcessGroupAggregator::new();
        agg.apply_tick(vec![
            sample(1, "b", 10.0, 1.0),
            sample(2, "a", 5.0, 3.0),
            sample(3, "c", 1.0, 2.0),
        ]);

        agg.sort_by(GroupSortKey::Name);
        assert_eq!(names(&agg), ["c", "b", "a"]);
        agg.sort_by(GroupSortKey::Name);
        assert_eq!(names(&agg), ["a", "b", "c"]);

        agg.sort_by(GroupSortKey::Upload);
        assert_eq!(names(&agg), ["a", "c", "b"]);
        let state = agg.sort_state();
        assert_eq!(
            state.indicator_for(GroupSortKey::Upload),
            SortIndicator::Descending
        );
        assert_eq!(
            state.indicator_for(GroupSortKey::Download),
            SortIndicator::None
        );

        agg.sort_by(GroupSortKey::Download);
        assert_eq!(names(&agg), ["b", "a", "c"]);
    }
}
