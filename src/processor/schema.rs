use crate::processor::column::ColumnType;
use crate::processor::{ProcessorError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub column_type: ColumnType,
    /// Alias of the frame this field came from, set by `DataFrame::alias`
    pub qualifier: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Field {
            name: name.into(),
            column_type,
            qualifier: None,
        }
    }

    pub fn qualified_name(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}", q, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Schema { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Resolve a column reference to its position.
    ///
    /// `q.name` matches the field `name` carrying qualifier `q`. Otherwise the
    /// whole reference is matched against plain names, which must be unique.
    pub fn index_of(&self, reference: &str) -> Result<usize> {
        if let Some((qualifier, name)) = reference.split_once('.') {
            let hits: Vec<usize> = self
                .fields
                .iter()
                .enumerate()
                .filter(|(_, f)| f.qualifier.as_deref() == Some(qualifier) && f.name == name)
                .map(|(i, _)| i)
                .collect();
            match hits.len() {
                1 => return Ok(hits[0]),
                0 => {}
                _ => return Err(ProcessorError::AmbiguousColumn(reference.to_string())),
            }
        }

        let hits: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.name == reference)
            .map(|(i, _)| i)
            .collect();
        match hits.len() {
            1 => Ok(hits[0]),
            0 => Err(ProcessorError::MissingColumn(reference.to_string())),
            _ => Err(ProcessorError::AmbiguousColumn(reference.to_string())),
        }
    }

    /// Tree rendering used by `print_schema`
    pub fn tree_string(&self) -> String {
        let mut out = String::from("root\n");
        for f in &self.fields {
            out.push_str(&format!(
                " |-- {}: {} (nullable = true)\n",
                f.name, f.column_type
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined_schema() -> Schema {
        let mut left = Field::new("yearID", ColumnType::Int64);
        left.qualifier = Some("b".into());
        let mut right = Field::new("yearID", ColumnType::Int64);
        right.qualifier = Some("m".into());
        Schema::new(vec![
            left,
            Field::new("playerID", ColumnType::Str),
            right,
            Field::new("max(R)", ColumnType::Int64),
        ])
    }

    #[test]
    fn test_qualified_lookup() {
        let schema = joined_schema();
        assert_eq!(schema.index_of("b.yearID").unwrap(), 0);
        assert_eq!(schema.index_of("m.yearID").unwrap(), 2);
        assert_eq!(schema.index_of("playerID").unwrap(), 1);
        assert_eq!(schema.index_of("max(R)").unwrap(), 3);
    }

    #[test]
    fn test_ambiguous_and_missing() {
        let schema = joined_schema();
        assert!(matches!(
            schema.index_of("yearID"),
            Err(ProcessorError::AmbiguousColumn(_))
        ));
        assert!(matches!(
            schema.index_of("teamID"),
            Err(ProcessorError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_tree_string() {
        let schema = Schema::new(vec![Field::new("x", ColumnType::Int64)]);
        assert_eq!(
            schema.tree_string(),
            "root\n |-- x: long (nullable = true)\n"
        );
    }
}
