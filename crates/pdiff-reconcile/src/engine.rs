use crate::{Discrepancy, FieldValue, Normalizer, Schema, Side, Snapshot};

/// Compares two snapshots of the same account.
///
/// Holds the declared schema (ordering) and the normalizer; the comparison
/// itself is a pure function of the two snapshots.
#[derive(Clone, Debug)]
pub struct DiffEngine {
    schema: Schema,
    normalizer: Normalizer,
}

impl DiffEngine {
    pub fn new(schema: Schema, normalizer: Normalizer) -> Self {
        Self { schema, normalizer }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Deterministic comparison:
    /// 1) flat fields, in declared order, after normalization;
    /// 2) valuation cells, walking B's years ascending and declared attrs
    ///    (year key excluded) within each year.
    ///
    /// A year present in B but missing in A reports every compared attr with
    /// `source_a = Absent`, whatever B holds. Years only in A are not walked.
    pub fn diff(&self, account: &str, a: &Snapshot, b: &Snapshot) -> Vec<Discrepancy> {
        let mut diffs = Vec::new();

        for key in self.schema.fields() {
            let va = self
                .normalizer
                .normalize(key, Side::A, a.fields.get(key).map(String::as_str));
            let vb = self
                .normalizer
                .normalize(key, Side::B, b.fields.get(key).map(String::as_str));
            if va != vb {
                diffs.push(Discrepancy {
                    account: account.to_string(),
                    key: key.clone(),
                    source_a: va,
                    source_b: vb,
                    is_valuation: false,
                });
            }
        }

        for (year, b_row) in &b.valuations {
            let a_row = a.valuations.get(year);

            for attr in self.schema.compared_attrs() {
                let vb = b_row.get(attr).cloned().unwrap_or(FieldValue::Absent);
                let va = match a_row {
                    Some(row) => row.get(attr).cloned().unwrap_or(FieldValue::Absent),
                    None => {
                        diffs.push(Discrepancy {
                            account: account.to_string(),
                            key: Discrepancy::valuation_key(attr, *year),
                            source_a: FieldValue::Absent,
                            source_b: vb,
                            is_valuation: true,
                        });
                        continue;
                    }
                };

                if va != vb {
                    diffs.push(Discrepancy {
                        account: account.to_string(),
                        key: Discrepancy::valuation_key(attr, *year),
                        source_a: va,
                        source_b: vb,
                        is_valuation: true,
                    });
                }
            }
        }

        diffs
    }
}
