//! Shared fixtures for command tests

use crate::blob::{BlobStore, FsBlobStore};
use crate::commands::{cmd_create_project, ProjectCreate};
use crate::config::Config;
use crate::db::{Db, Document, DocumentStatus, Project};
use std::path::PathBuf;
use tempfile::TempDir;

pub(crate) struct TestEnv {
    pub config: Config,
    pub db: Db,
    pub blob: FsBlobStore,
    pub tmp: TempDir,
}

pub(crate) async fn setup_env() -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.init_paths(Some(tmp.path().to_path_buf()));

    let db = Db::new(&config.paths.db_file).await.unwrap();
    let blob = FsBlobStore::new(config.paths.blob_dir.clone()).unwrap();

    TestEnv {
        config,
        db,
        blob,
        tmp,
    }
}

impl TestEnv {
    /// Write a scratch input file outside the blob root
    pub fn write_scratch_file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.tmp.path().join("scratch").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    pub async fn create_project(&self, owner: &str, name: &str) -> Project {
        cmd_create_project(
            &self.db,
            owner,
            ProjectCreate {
                name: name.to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    /// Insert a document already sitting in extracted status, ready for review
    pub async fn insert_extracted_document(
        &self,
        project: &Project,
        vendor: &str,
        document_type: &str,
    ) -> Document {
        let mut doc = Document::new(
            project.id.clone(),
            project.owner.clone(),
            format!("{}.pdf", vendor.to_lowercase().replace(' ', "-")),
            "blobs/missing.pdf".to_string(),
        );
        doc.status = DocumentStatus::Extracted.to_string();
        doc.vendor_name = Some(vendor.to_string());
        doc.document_type = Some(document_type.to_string());
        doc.raw_extraction = Some("{}".to_string());
        self.db.insert_document(&doc).await.unwrap();
        doc
    }

    /// Insert a pending document whose bytes exist in the blob store
    pub async fn insert_pending_document(&self, project: &Project, content: &[u8]) -> Document {
        let file_path = self
            .blob
            .store(
                &format!("documents/{}/test.pdf", project.id),
                content,
                "application/pdf",
            )
            .await
            .unwrap();

        let mut doc = Document::new(
            project.id.clone(),
            project.owner.clone(),
            "test.pdf".to_string(),
            file_path,
        );
        doc.mime_type = Some("application/pdf".to_string());
        doc.file_size = Some(content.len() as i64);
        self.db.insert_document(&doc).await.unwrap();
        doc
    }
}
