use anyhow::Context;
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use evolf_common::{table, ClientConfig};
use evolf_dataset::models::{entry_export_file_name, COMPLETE_DATASET_FILE, SELECTION_EXPORT_FILE};
use evolf_dataset::{DatasetClient, DatasetDetail, DatasetQuery, DetailContext, SortOrder};

#[derive(Subcommand, Debug)]
pub enum DatasetCommand {
    /// List one page of entries
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        limit: u32,

        /// Free-text filter
        #[arg(short, long)]
        search: Option<String>,

        /// evolfId, receptor, ligand, species, class, mutation or a raw column
        #[arg(long, default_value = "evolfId")]
        sort_by: String,

        #[arg(long, default_value = "desc")]
        order: SortOrder,

        #[arg(long)]
        species: Option<String>,

        #[arg(long)]
        class: Option<String>,

        #[arg(long)]
        mutation_type: Option<String>,
    },

    /// Print the number of rows in the dataset
    Count,

    /// Show every field of one entry
    Show { evolf_id: String },

    /// Export entries as a zip archive
    Export {
        /// EvOlf ids; one id exports a single entry
        evolf_ids: Vec<String>,

        /// Download the complete dataset instead
        #[arg(long, conflicts_with = "evolf_ids")]
        all: bool,

        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Search receptors, ligands and identifiers
    Search { query: String },
}

pub async fn run(config: &ClientConfig, cmd: DatasetCommand) -> anyhow::Result<()> {
    let client = DatasetClient::new(&config.api)?;

    match cmd {
        DatasetCommand::List { page, limit, search, sort_by, order, species, class, mutation_type } => {
            let query = DatasetQuery {
                page,
                limit,
                search,
                sort_by,
                sort_order: order,
                species,
                class,
                mutation_type,
            };
            let page = client.fetch_page(&query).await?;
            let rows: Vec<Vec<String>> = page
                .entries
                .iter()
                .map(|e| {
                    vec![
                        e.evolf_id.clone(),
                        e.receptor.clone(),
                        e.ligand.clone(),
                        e.species.clone(),
                        e.class.clone(),
                        e.mutation.clone(),
                    ]
                })
                .collect();
            print!("{}", table::render(&["EvOlf ID", "Receptor", "Ligand", "Species", "Class", "Mutation"], &rows));
            println!(
                "Page {} of {} ({} entries)",
                page.pagination.current_page, page.pagination.total_pages, page.pagination.total_items
            );
        }
        DatasetCommand::Count => {
            println!("{}", client.count().await?);
        }
        DatasetCommand::Show { evolf_id } => {
            let mut view = DetailContext::new(Arc::new(client));
            let detail = view.load(&evolf_id).await?;
            for (label, value) in detail_fields(detail) {
                if !value.is_empty() {
                    println!("{:<18} {}", label, value);
                }
            }
            view.clear();
        }
        DatasetCommand::Export { evolf_ids, all, out } => {
            let out = out.unwrap_or_else(|| config.download.output_dir.clone());
            let (file_name, bytes) = if all {
                (COMPLETE_DATASET_FILE.to_string(), client.download_complete().await?)
            } else if let [single] = evolf_ids.as_slice() {
                (entry_export_file_name(single.trim()), client.export_entry(single).await?)
            } else {
                (SELECTION_EXPORT_FILE.to_string(), client.export_entries(&evolf_ids).await?)
            };
            let path = save(&out, &file_name, &bytes).await?;
            println!("Saved {}", path.display());
        }
        DatasetCommand::Search { query } => {
            let found = client.search(&query).await?;
            let rows: Vec<Vec<String>> = found
                .results
                .iter()
                .map(|h| vec![h.evolf_id.clone(), h.receptor.clone(), h.ligand.clone(), h.species.clone()])
                .collect();
            print!("{}", table::render(&["EvOlf ID", "Receptor", "Ligand", "Species"], &rows));
            if !found.suggestions.is_empty() {
                println!("Did you mean: {}", found.suggestions.join(", "));
            }
        }
    }
    Ok(())
}

fn detail_fields(d: &DatasetDetail) -> Vec<(&'static str, &str)> {
    vec![
        ("EvOlf ID", d.evolf_id.as_str()),
        ("Receptor", d.receptor.as_str()),
        ("Gene symbol", d.gene_symbol.as_str()),
        ("Class", d.class.as_str()),
        ("Subtype", d.receptor_subtype.as_str()),
        ("Species", d.species.as_str()),
        ("UniProt", d.uniprot_id.as_str()),
        ("Ligand", d.ligand.as_str()),
        ("SMILES", d.smiles.as_str()),
        ("InChIKey", d.inchi_key.as_str()),
        ("IUPAC name", d.iupac_name.as_str()),
        ("ChEMBL", d.chembl_id.as_str()),
        ("PubChem CID", d.cid.as_str()),
        ("Mutation", d.mutation.as_str()),
        ("Mutation type", d.mutation_type.as_str()),
        ("Mutation status", d.mutation_status.as_str()),
        ("Mutation impact", d.mutation_impact.as_str()),
        ("Method", d.method.as_str()),
        ("Value", d.value.as_str()),
        ("Source", d.source.as_str()),
        ("Source links", d.source_links.as_str()),
        ("Comments", d.comments.as_str()),
    ]
}

async fn save(dir: &Path, file_name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = save(&dir.path().join("exports"), "EvOlf01_data.zip", b"PK").await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"PK");
    }

    #[test]
    fn test_detail_fields_start_with_id() {
        let mut detail = DatasetDetail::default();
        detail.evolf_id = "EvOlf01".into();
        detail.receptor = "HTR1A".into();
        let fields = detail_fields(&detail);
        assert_eq!(fields[0], ("EvOlf ID", "EvOlf01"));
        assert_eq!(fields.iter().filter(|(_, v)| !v.is_empty()).count(), 2);
    }
}
