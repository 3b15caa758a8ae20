//! Backend operation names and alias fallback
//!
//! Operation names drift between deployed backend versions. Each
//! operation carries an ordered list of known aliases, current name
//! first, and the client walks the list whenever the backend answers
//! with an unknown-operation error. Aliases that worked are remembered
//! per process so steady state pays for one name, not a probe sequence.

use dashmap::DashMap;

/// Logical operations the client performs against the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    FetchDocument,
    AttachRecipient,
    SubmitSignature,
    FindContact,
    CreateContact,
}

impl OperationKind {
    /// Current wire name, also the first alias tried
    pub fn as_str(&self) -> &'static str {
        self.aliases()[0]
    }

    /// Known wire names, newest first
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            OperationKind::FetchDocument => &["get_document", "fetch_document", "document_get"],
            OperationKind::AttachRecipient => {
                &["attach_recipient", "add_signer", "assign_signer"]
            }
            OperationKind::SubmitSignature => {
                &["submit_signature", "sign_document", "record_signature"]
            }
            OperationKind::FindContact => &["find_contact", "lookup_contact", "contact_by_email"],
            OperationKind::CreateContact => &["create_contact", "add_contact"],
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Remembers which alias each backend deployment actually answers to
pub struct AliasTable {
    worked: DashMap<OperationKind, &'static str>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self {
            worked: DashMap::new(),
        }
    }

    /// Aliases to try in order: the remembered one first, then the rest
    /// of the static list
    pub fn candidates(&self, op: OperationKind) -> Vec<&'static str> {
        let mut out = Vec::with_capacity(op.aliases().len());
        if let Some(first) = self.worked.get(&op) {
            out.push(*first);
        }
        for alias in op.aliases() {
            if !out.contains(alias) {
                out.push(alias);
            }
        }
        out
    }

    /// Remember the alias that worked. The table is read-mostly, so
    /// skip the write when nothing changed.
    pub fn record(&self, op: OperationKind, alias: &'static str) {
        let changed = self.worked.get(&op).map(|cur| *cur != alias).unwrap_or(true);
        if changed {
            self.worked.insert(op, alias);
        }
    }

    pub fn remembered(&self, op: OperationKind) -> Option<&'static str> {
        self.worked.get(&op).map(|a| *a)
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name_leads_the_alias_list() {
        for op in [
            OperationKind::FetchDocument,
            OperationKind::AttachRecipient,
            OperationKind::SubmitSignature,
            OperationKind::FindContact,
            OperationKind::CreateContact,
        ] {
            assert_eq!(op.as_str(), op.aliases()[0]);
            assert!(!op.aliases().is_empty());
        }
    }

    #[test]
    fn test_candidates_follow_static_order_by_default() {
        let table = AliasTable::new();
        assert_eq!(
            table.candidates(OperationKind::SubmitSignature),
            vec!["submit_signature", "sign_document", "record_signature"]
        );
    }

    #[test]
    fn test_recorded_alias_moves_to_the_front() {
        let table = AliasTable::new();
        table.record(OperationKind::SubmitSignature, "sign_document");
        assert_eq!(
            table.candidates(OperationKind::SubmitSignature),
            vec!["sign_document", "submit_signature", "record_signature"]
        );
        assert_eq!(
            table.remembered(OperationKind::SubmitSignature),
            Some("sign_document")
        );
    }

    #[test]
    fn test_tables_track_operations_independently() {
        let table = AliasTable::new();
        table.record(OperationKind::FetchDocument, "fetch_document");
        assert_eq!(table.remembered(OperationKind::AttachRecipient), None);
        assert_eq!(
            table.candidates(OperationKind::AttachRecipient)[0],
            "attach_recipient"
        );
    }
}
