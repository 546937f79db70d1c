//! Request assembly from pasted text, uploaded files and CSV rows.
//!
//! Only emptiness, FASTA-header, file-extension and ligand-count checks run
//! here. Character sets and length limits are the backend's job; its 400
//! responses are surfaced verbatim by the submitter.

use std::path::Path;
use tracing::{debug, info, warn};

use evolf_common::{EvolfError, Result, ValidationError};

use crate::models::{Ligand, PredictionRequest, MAX_LIGANDS, MIN_LIGANDS};

/// Receptor uploads must end in one of these (case-insensitive).
pub const RECEPTOR_FILE_EXTENSIONS: [&str; 3] = [".fasta", ".fa", ".txt"];

/// One editable ligand row in the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LigandField {
    pub id: u32,
    pub smiles: String,
    pub name: String,
}

/// Outcome of a successful CSV import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvImport {
    pub imported: usize,
    /// Set when rows past the ligand cap were dropped.
    pub warning: Option<String>,
}

/// Mutable form state that produces an immutable [`PredictionRequest`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    receptor: String,
    ligands: Vec<LigandField>,
    mutation: Option<String>,
    next_id: u32,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    /// Starts with a single empty ligand field.
    pub fn new() -> Self {
        Self {
            receptor: String::new(),
            ligands: vec![LigandField { id: 1, smiles: String::new(), name: String::new() }],
            mutation: None,
            next_id: 2,
        }
    }

    pub fn receptor(&self) -> &str {
        &self.receptor
    }

    pub fn set_receptor_text(&mut self, text: &str) {
        self.receptor = text.to_string();
    }

    /// Takes an uploaded receptor file. The name decides acceptance; the
    /// content is not sniffed.
    pub fn set_receptor_from_upload(&mut self, file_name: &str, contents: &str) -> Result<()> {
        check_receptor_extension(file_name)?;
        self.receptor = contents.to_string();
        info!("Loaded receptor sequence from {} ({} bytes)", file_name, contents.len());
        Ok(())
    }

    pub fn set_receptor_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        check_receptor_extension(&file_name)?;
        let contents = std::fs::read_to_string(path)?;
        self.set_receptor_from_upload(&file_name, &contents)
    }

    pub fn mutation(&self) -> Option<&str> {
        self.mutation.as_deref()
    }

    pub fn set_mutation(&mut self, mutation: Option<&str>) {
        self.mutation = mutation.map(str::trim).filter(|m| !m.is_empty()).map(str::to_string);
    }

    pub fn ligand_fields(&self) -> &[LigandField] {
        &self.ligands
    }

    /// Appends an empty ligand field and returns its id.
    pub fn add_ligand_field(&mut self) -> Result<u32> {
        if self.ligands.len() >= MAX_LIGANDS {
            warn!("Rejected ligand field: already at {}", MAX_LIGANDS);
            return Err(ValidationError::TooManyLigands { max: MAX_LIGANDS }.into());
        }
        let id = self.allocate_id();
        self.ligands.push(LigandField { id, smiles: String::new(), name: String::new() });
        Ok(id)
    }

    pub fn remove_ligand_field(&mut self, id: u32) -> Result<()> {
        if self.ligands.len() <= MIN_LIGANDS {
            warn!("Rejected removal of ligand field {}: at least {} required", id, MIN_LIGANDS);
            return Err(ValidationError::TooFewLigands { min: MIN_LIGANDS }.into());
        }
        let pos = self
            .ligands
            .iter()
            .position(|f| f.id == id)
            .ok_or(ValidationError::UnknownLigandField(id))?;
        self.ligands.remove(pos);
        Ok(())
    }

    pub fn set_ligand(&mut self, id: u32, smiles: &str, name: &str) -> Result<()> {
        let field = self
            .ligands
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(ValidationError::UnknownLigandField(id))?;
        field.smiles = smiles.to_string();
        field.name = name.to_string();
        Ok(())
    }

    /// Replaces the ligand fields with rows from a CSV upload.
    ///
    /// The first non-empty line is the header. A column whose header
    /// contains "smiles" is required; one containing "name" is optional.
    /// On any error the current fields are left untouched.
    pub fn parse_ligands_from_csv(&mut self, text: &str) -> Result<CsvImport> {
        let ligands = parse_ligand_csv(text)?;
        let found = ligands.len();
        if found == 0 {
            return Err(ValidationError::NoLigandSmiles.into());
        }

        let warning = if found > MAX_LIGANDS {
            let msg = format!(
                "Only the first {} ligands were imported ({} rows found)",
                MAX_LIGANDS, found
            );
            warn!("{}", msg);
            Some(msg)
        } else {
            None
        };

        let mut fields = Vec::with_capacity(found.min(MAX_LIGANDS));
        for ligand in ligands.into_iter().take(MAX_LIGANDS) {
            let id = self.allocate_id();
            fields.push(LigandField {
                id,
                smiles: ligand.smiles,
                name: ligand.name.unwrap_or_default(),
            });
        }
        let imported = fields.len();
        self.ligands = fields;
        info!("Imported {} ligands from CSV", imported);

        Ok(CsvImport { imported, warning })
    }

    /// Validates the form and produces a request. Never touches the network.
    pub fn build(&self) -> Result<PredictionRequest> {
        let receptor = self.receptor.trim();
        if receptor.is_empty() {
            return Err(ValidationError::EmptyReceptor.into());
        }
        if receptor.starts_with('>') {
            return Err(ValidationError::FastaHeader.into());
        }

        let ligands: Vec<Ligand> = self
            .ligands
            .iter()
            .filter(|f| !f.smiles.trim().is_empty())
            .map(|f| Ligand::new(&f.smiles, Some(f.name.as_str())))
            .collect();
        if ligands.is_empty() {
            return Err(ValidationError::NoLigandSmiles.into());
        }

        debug!("Built prediction request with {} ligands", ligands.len());
        Ok(PredictionRequest::new(receptor.to_string(), ligands, self.mutation.clone()))
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn check_receptor_extension(file_name: &str) -> Result<()> {
    let lower = file_name.to_ascii_lowercase();
    if RECEPTOR_FILE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedFileExtension(file_name.to_string()).into())
    }
}

/// All data rows with a non-empty SMILES, in file order.
fn parse_ligand_csv(text: &str) -> Result<Vec<Ligand>> {
    let cleaned: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if cleaned.is_empty() {
        return Err(ValidationError::EmptyCsv.into());
    }
    let joined = cleaned.join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(joined.as_bytes());

    let headers = reader.headers().map_err(csv_error)?.clone();
    let smiles_col = headers
        .iter()
        .position(|h| h.to_ascii_lowercase().contains("smiles"))
        .ok_or(ValidationError::MissingSmilesColumn)?;
    let name_col = headers
        .iter()
        .enumerate()
        .position(|(i, h)| i != smiles_col && h.to_ascii_lowercase().contains("name"));

    let mut ligands = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let smiles = record.get(smiles_col).unwrap_or_default();
        if smiles.is_empty() {
            continue;
        }
        let name = name_col.and_then(|i| record.get(i));
        ligands.push(Ligand::new(smiles, name));
    }
    Ok(ligands)
}

fn csv_error(e: csv::Error) -> EvolfError {
    EvolfError::Other(anyhow::anyhow!("Failed to read CSV: {}", e))
}
