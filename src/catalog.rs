use crate::error::DbError;
use crate::heap_file::HeapFile;
use crate::tuple::TupleDesc;
use crate::types::Type::{IntType, StringType};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::sync::{Arc, RwLock};

pub struct Catalog {
    // maps table name to table
    tables: RwLock<HashMap<String, Arc<HeapFile>>>,
    // maps table id to table
    table_ids: RwLock<HashMap<usize, Arc<HeapFile>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            tables: RwLock::new(HashMap::new()),
            table_ids: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_table(&self, file: HeapFile, name: String) {
        let mut tables = self.tables.write().unwrap();
        let file_id = file.get_id();
        tables.insert(name.clone(), Arc::new(file));
        let mut table_ids = self.table_ids.write().unwrap();
        table_ids.insert(file_id, Arc::clone(tables.get(&name).unwrap()));
    }

    // Retrieves the table with the specified name
    pub fn get_table_from_name(&self, name: &str) -> Option<Arc<HeapFile>> {
        let tables = self.tables.read().unwrap();
        tables.get(name).map(Arc::clone)
    }

    // Retrieves the table with the specified id
    pub fn get_table_from_id(&self, id: usize) -> Option<Arc<HeapFile>> {
        let table_ids = self.table_ids.read().unwrap();
        table_ids.get(&id).map(Arc::clone)
    }

    // Retrieves the tuple descriptor for the specified table
    pub fn get_tuple_desc(&self, table_id: usize) -> Option<TupleDesc> {
        let table = self.get_table_from_id(table_id);
        table.map(|t| t.get_tuple_desc().clone())
    }

    /// Loads table schemas from a text file, one table per line, in the
    /// form `name (field: Type, field: Type, ...)`. Each table's backing
    /// file is opened (creating it if absent) at `data/<name>.dat` and
    /// registered under `name`. Malformed lines fail with `DbError::SchemaFile`
    /// rather than panicking, so a bad catalog file doesn't take the
    /// process down before a caller gets a chance to report it.
    pub fn load_schema(&self, schema_file_path: &str) -> Result<(), DbError> {
        let schema_file = File::open(schema_file_path)
            .map_err(|e| DbError::SchemaFile(format!("cannot open {}: {}", schema_file_path, e)))?;
        let reader = BufReader::new(schema_file);
        for line in reader.lines() {
            let line = line.map_err(|e| DbError::SchemaFile(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let split_parens: Vec<&str> = line.split('(').collect();
            if split_parens.len() < 2 {
                return Err(DbError::SchemaFile(format!("malformed schema line: {:?}", line)));
            }
            let table_name = split_parens[0].to_string().replace(' ', "");
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(format!("data/{}.dat", table_name))
                .map_err(|e| DbError::SchemaFile(format!("cannot open data file for {}: {}", table_name, e)))?;

            let fields: Vec<&str> = split_parens[1].trim_end_matches(')').split(',').collect();
            let mut field_types = vec![];
            let mut field_names = vec![];
            for field in fields.iter() {
                let parts: Vec<&str> = field.split(':').collect();
                if parts.len() != 2 {
                    return Err(DbError::SchemaFile(format!("malformed field spec: {:?}", field)));
                }
                let field_name = parts[0].to_string().replace(' ', "");
                let field_type = parts[1].to_string().replace(' ', "").replace(')', "");
                let field_type = match field_type.as_str() {
                    "Int" => IntType,
                    "String" => StringType,
                    other => {
                        return Err(DbError::SchemaFile(format!("invalid field type: {:?}", other)))
                    }
                };
                field_names.push(field_name);
                field_types.push(field_type);
            }
            let td = TupleDesc::named(field_types, field_names)?;
            let heap_file = HeapFile::new(file, td);
            log::info!("loaded table {} from schema {}", table_name, schema_file_path);
            self.add_table(heap_file, table_name);
        }
        Ok(())
    }
}
