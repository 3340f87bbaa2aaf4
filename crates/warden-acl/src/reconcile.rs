// Policy link reconciliation
// Computes the links a token ends up with after an update. Pure; policy IDs must
// already be resolved to canonical form by the caller.

use crate::model::PolicyLink;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkMode {
    /// Keep existing links and append the requested ones that are missing
    Merge,
    /// The requested links become the token's exact link set
    #[default]
    Replace,
}

impl LinkMode {
    pub fn from_merge_flag(merge: bool) -> Self {
        if merge { LinkMode::Merge } else { LinkMode::Replace }
    }
}

/// Compute a token's new policy links.
///
/// Presence only compares links of the same kind: a Name-link and an ID-link to the
/// same policy are both kept.
pub fn reconcile_policy_links(
    existing: &[PolicyLink],
    names: &[String],
    ids: &[String],
    mode: LinkMode,
) -> Vec<PolicyLink> {
    match mode {
        LinkMode::Replace => names
            .iter()
            .map(PolicyLink::by_name)
            .chain(ids.iter().map(PolicyLink::by_id))
            .collect(),
        LinkMode::Merge => {
            let mut links = existing.to_vec();
            for name in names {
                if !links.iter().any(|link| &link.name == name) {
                    links.push(PolicyLink::by_name(name.clone()));
                }
            }
            for id in ids {
                if !links.iter().any(|link| &link.id == id) {
                    links.push(PolicyLink::by_id(id.clone()));
                }
            }
            links
        }
    }
}
