use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use crate::models::{EvidenceItem, EvidenceStatus, Ksb, KsbType};

pub const DEFAULT_FOCUS_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KsbProgressItem {
    pub ksb_type: KsbType,
    pub achieved: usize,
    pub total: usize,
}

impl KsbProgressItem {
    /// Progress bar width in percent; zero when the standard has no KSBs of this type.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.achieved as f64 * 100.0 / self.total as f64
    }

    pub fn is_applicable(&self) -> bool {
        self.total > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusArea {
    pub ksb_type: KsbType,
    pub code: String,
    pub name: String,
    pub remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KsbProgress {
    pub items: Vec<KsbProgressItem>,
    pub focus_areas: Vec<FocusArea>,
}

impl KsbProgress {
    #[cfg(test)]
    pub fn item(&self, ksb_type: KsbType) -> Option<&KsbProgressItem> {
        self.items.iter().find(|item| item.ksb_type == ksb_type)
    }
}

pub fn compute_progress(ksbs: &[Ksb], evidence: &[EvidenceItem], focus_limit: usize) -> KsbProgress {
    let mut approved: HashMap<Uuid, u32> = HashMap::new();
    for item in evidence
        .iter()
        .filter(|item| item.status == EvidenceStatus::Approved)
    {
        // One evidence item counts once per KSB even if it lists it twice.
        let linked: HashSet<Uuid> = item.ksb_ids.iter().copied().collect();
        for ksb_id in linked {
            *approved.entry(ksb_id).or_insert(0) += 1;
        }
    }

    let mut seen = HashSet::new();
    let required: Vec<&Ksb> = ksbs.iter().filter(|ksb| seen.insert(ksb.id)).collect();

    let items = KsbType::ALL
        .into_iter()
        .map(|ksb_type| {
            let of_type = required.iter().filter(|ksb| ksb.ksb_type == ksb_type);
            let total = of_type.clone().count();
            let achieved = of_type
                .filter(|ksb| approved.get(&ksb.id).copied().unwrap_or(0) > 0)
                .count();
            KsbProgressItem {
                ksb_type,
                achieved,
                total,
            }
        })
        .collect();

    let mut focus_areas: Vec<FocusArea> = required
        .iter()
        .filter_map(|ksb| {
            let target = ksb.required_evidence.max(1) as u32;
            let have = approved.get(&ksb.id).copied().unwrap_or(0);
            (have < target).then(|| FocusArea {
                ksb_type: ksb.ksb_type,
                code: ksb.code.clone(),
                name: ksb.title.clone(),
                remaining: target - have,
            })
        })
        .collect();

    focus_areas.sort_by(|a, b| b.remaining.cmp(&a.remaining).then_with(|| a.code.cmp(&b.code)));
    focus_areas.truncate(focus_limit);

    KsbProgress { items, focus_areas }
}
