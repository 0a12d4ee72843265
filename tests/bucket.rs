#[cfg(test)]
mod tests {
    use gridstore::storage::memory::MemoryBackend;
    use gridstore::*;
    use serde_json::json;

    /// Helper to build a bucket over a fresh in-memory backend
    fn create_test_bucket(chunk_size: u32) -> (MemoryBackend, Bucket) {
        let backend = MemoryBackend::new("test");
        let options = BucketOptions::default().with_chunk_size(chunk_size);
        let bucket = Bucket::new(&backend, options).expect("can't create bucket");
        (backend, bucket)
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    /// Test storing and retrieving a file by id
    #[tokio::test]
    async fn test_upload_and_download_by_id() {
        let (_backend, bucket) = create_test_bucket(1024);
        let data = sample(5000);

        let record = bucket
            .upload("photo.jpg", UploadSource::Bytes(data.clone()), UploadOptions::default())
            .await
            .expect("Failed to upload file");

        assert_eq!(record.filename, "photo.jpg");
        assert_eq!(record.length, 5000);
        assert_eq!(record.chunk_size, 1024);
        assert_eq!(record.chunk_count(), 5);

        let stored = bucket
            .chunks_collection()
            .chunk_count(&record.id)
            .await
            .expect("Failed to count chunks");
        assert_eq!(stored, 5);

        let content = bucket
            .get_file_content(&record.id)
            .await
            .expect("Failed to download file");
        assert_eq!(content, data);
    }

    /// Test that downloads are served one chunk at a time, in order
    #[tokio::test]
    async fn test_download_stream_yields_chunks_in_order() {
        let (_backend, bucket) = create_test_bucket(4);
        let record = bucket
            .upload("a.txt", UploadSource::Bytes(b"abcdefghij".to_vec()), UploadOptions::default())
            .await
            .unwrap();

        let mut stream = bucket.open_download_stream(&record.id).await.unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next_chunk().await.unwrap() {
            chunks.push(chunk);
        }
        assert_eq!(chunks, vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij".to_vec()]);
        assert_eq!(stream.position(), 10);
    }

    /// Test empty uploads produce a record and no chunks
    #[tokio::test]
    async fn test_empty_file() {
        let (_backend, bucket) = create_test_bucket(16);
        let record = bucket
            .upload("empty.bin", UploadSource::Bytes(Vec::new()), UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(record.length, 0);
        assert_eq!(record.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(bucket.chunks_collection().chunk_count(&record.id).await.unwrap(), 0);
        assert!(bucket.get_file_content(&record.id).await.unwrap().is_empty());
    }

    /// Test unknown ids fail with NotFound
    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let (_backend, bucket) = create_test_bucket(16);
        let result = bucket.open_download_stream(&FileId::new()).await;
        assert!(matches!(result, Err(GridError::NotFound(_))));
    }

    /// Test auto metadata is populated and caller keys win
    #[tokio::test]
    async fn test_auto_metadata_merge() {
        let (_backend, bucket) = create_test_bucket(16);
        let mut metadata = Metadata::new();
        metadata.insert("owner".into(), json!("rogue-one"));
        metadata.insert("uuid".into(), json!("fixed"));

        let record = bucket
            .upload(
                "meta.txt",
                UploadSource::Bytes(b"hello".to_vec()),
                UploadOptions::default().with_metadata(metadata),
            )
            .await
            .unwrap();

        assert_eq!(record.metadata["owner"], json!("rogue-one"));
        assert_eq!(record.metadata["uuid"], json!("fixed"));
        assert_eq!(record.metadata["downloads"], json!(0));
        assert!(record.metadata.contains_key("created_at"));
        assert!(record.metadata.contains_key("updated_at"));
        assert_eq!(record.content_type, "text/plain");
    }

    /// Test a full download bumps the counter, and increment_download adds to it
    #[tokio::test]
    async fn test_download_counter() {
        let (_backend, bucket) = create_test_bucket(2);
        let record = bucket
            .upload("count.txt", UploadSource::Bytes(b"12345".to_vec()), UploadOptions::default())
            .await
            .unwrap();

        bucket.get_file_content(&record.id).await.unwrap();
        bucket.increment_download(&record.id).await;
        assert_eq!(bucket.get_file(&record.id).await.unwrap().downloads(), 2);

        // a partial read does not count
        let mut stream = bucket.open_download_stream(&record.id).await.unwrap();
        stream.next_chunk().await.unwrap();
        drop(stream);
        assert_eq!(bucket.get_file(&record.id).await.unwrap().downloads(), 2);

        // missing ids are only logged
        bucket.increment_download(&FileId::new()).await;
    }

    /// Test no auto metadata and no counter when the policy is off
    #[tokio::test]
    async fn test_auto_metadata_disabled() {
        let backend = MemoryBackend::default();
        let options = BucketOptions::default().with_auto_metadata(false);
        let bucket = Bucket::new(&backend, options).unwrap();

        let record = bucket
            .upload("plain.txt", UploadSource::Bytes(b"x".to_vec()), UploadOptions::default())
            .await
            .unwrap();
        assert!(record.metadata.is_empty());

        bucket.get_file_content(&record.id).await.unwrap();
        assert!(bucket.get_file(&record.id).await.unwrap().metadata.is_empty());
    }

    /// Test rename keeps the content and makes the new name findable
    #[tokio::test]
    async fn test_rename_preserves_content() {
        let (_backend, bucket) = create_test_bucket(3);
        let data = sample(10);
        let record = bucket
            .upload("star-wars.jpg", UploadSource::Bytes(data.clone()), UploadOptions::default())
            .await
            .unwrap();

        let renamed = bucket.rename(&record.id, "new.jpg").await.unwrap();
        assert_eq!(renamed.filename, "new.jpg");
        assert_eq!(renamed.length, record.length);

        assert_eq!(bucket.get_file_content(&record.id).await.unwrap(), data);
        let found = bucket
            .find_one(&Filter::by_filename("new.jpg"), &FindOptions::default())
            .await
            .unwrap()
            .expect("renamed file should be found");
        assert_eq!(found.id, record.id);
        assert!(bucket
            .find_one(&Filter::by_filename("star-wars.jpg"), &FindOptions::default())
            .await
            .unwrap()
            .is_none());

        let missing = bucket.rename(&FileId::new(), "x").await;
        assert!(matches!(missing, Err(GridError::NotFound(_))));
    }

    /// Test deleting twice reports a no-op the second time
    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_backend, bucket) = create_test_bucket(4);
        let record = bucket
            .upload("gone.txt", UploadSource::Bytes(sample(9)), UploadOptions::default())
            .await
            .unwrap();

        assert!(bucket.delete(&record.id).await.unwrap());
        assert_eq!(bucket.chunks_collection().chunk_count(&record.id).await.unwrap(), 0);
        assert!(!bucket.delete(&record.id).await.unwrap());
        assert!(bucket.get_file_content(&record.id).await.is_err());
    }

    /// Test drop clears one prefix and leaves its sibling alone
    #[tokio::test]
    async fn test_drop_clears_only_own_namespace() {
        let backend = MemoryBackend::default();
        let fs = Bucket::new(&backend, BucketOptions::default()).unwrap();
        let images = Bucket::new(&backend, BucketOptions::default().with_prefix("images")).unwrap();

        let a = fs
            .upload("a.txt", UploadSource::Bytes(b"aaa".to_vec()), UploadOptions::default())
            .await
            .unwrap();
        let b = images
            .upload("b.png", UploadSource::Bytes(b"bbb".to_vec()), UploadOptions::default())
            .await
            .unwrap();

        fs.drop_bucket().await.unwrap();

        assert_eq!(fs.find(&Filter::new(), &FindOptions::default()).await.unwrap().count(), 0);
        assert_eq!(fs.chunks_collection().chunk_count(&a.id).await.unwrap(), 0);
        assert_eq!(images.find(&Filter::new(), &FindOptions::default()).await.unwrap().count(), 1);
        assert_eq!(images.get_file_content(&b.id).await.unwrap(), b"bbb");
    }

    /// Test per-upload chunk size overrides the bucket default
    #[tokio::test]
    async fn test_chunk_size_override() {
        let (_backend, bucket) = create_test_bucket(1024);
        let record = bucket
            .upload(
                "small-chunks.bin",
                UploadSource::Bytes(sample(100)),
                UploadOptions::default().with_chunk_size(10),
            )
            .await
            .unwrap();
        assert_eq!(record.chunk_size, 10);
        assert_eq!(record.chunk_count(), 10);
        assert_eq!(bucket.chunk_size_bytes(), 1024);
        assert_eq!(bucket.validate(&record.id).await.unwrap().chunks, 10);
    }

    /// Test malformed input is rejected up front
    #[tokio::test]
    async fn test_validation_errors() {
        let (_backend, bucket) = create_test_bucket(16);
        let empty_name = bucket
            .upload("", UploadSource::Bytes(b"x".to_vec()), UploadOptions::default())
            .await;
        assert!(matches!(empty_name, Err(GridError::Validation(_))));

        let zero_chunks = bucket
            .upload(
                "a",
                UploadSource::Bytes(b"x".to_vec()),
                UploadOptions::default().with_chunk_size(0),
            )
            .await;
        assert!(matches!(zero_chunks, Err(GridError::Validation(_))));

        let backend = MemoryBackend::default();
        assert!(Bucket::new(&backend, BucketOptions::default().with_chunk_size(0)).is_err());
    }

    /// Test explicit ids are honoured and collisions rejected
    #[tokio::test]
    async fn test_explicit_id_collision() {
        let (_backend, bucket) = create_test_bucket(4);
        let id = FileId::new();
        let record = bucket
            .upload(
                "first",
                UploadSource::Bytes(b"original".to_vec()),
                UploadOptions::default().with_id(id),
            )
            .await
            .unwrap();
        assert_eq!(record.id, id);

        let second = bucket
            .upload(
                "second",
                UploadSource::Bytes(b"other".to_vec()),
                UploadOptions::default().with_id(id),
            )
            .await;
        assert!(matches!(second, Err(GridError::DuplicateKey(_))));
        assert_eq!(bucket.get_file_content(&id).await.unwrap(), b"original");
    }

    /// Test introspection accessors
    #[tokio::test]
    async fn test_accessors() {
        let (_backend, bucket) = create_test_bucket(2048);
        assert_eq!(bucket.bucket_name(), "fs");
        assert_eq!(bucket.chunk_size_bytes(), 2048);
        assert_eq!(bucket.database_name(), "test");
        assert_eq!(bucket.files_collection().namespace(), "fs.files");
        assert_eq!(bucket.chunks_collection().namespace(), "fs.chunks");
        assert_eq!(bucket.read_preference(), config::ReadPreference::PrimaryPreferred);
        assert_eq!(bucket.read_concern(), config::ReadConcern::Available);
    }

    /// Test metadata filters through the bucket
    #[tokio::test]
    async fn test_find_by_metadata() {
        let (_backend, bucket) = create_test_bucket(16);
        for (name, owner) in [("a", "luke"), ("b", "leia"), ("c", "luke")] {
            let mut metadata = Metadata::new();
            metadata.insert("owner".into(), json!(owner));
            bucket
                .upload(
                    name,
                    UploadSource::Bytes(name.as_bytes().to_vec()),
                    UploadOptions::default().with_metadata(metadata),
                )
                .await
                .unwrap();
        }

        let names: Vec<String> = bucket
            .find(
                &Filter::new().eq("metadata.owner", "luke"),
                &FindOptions::default().sort_by("filename", SortOrder::Descending),
            )
            .await
            .unwrap()
            .map(|r| r.filename)
            .collect();
        assert_eq!(names, vec!["c".to_string(), "a".to_string()]);
    }

    /// Test a bucket handed out by the registry can be dropped through its Arc
    #[tokio::test]
    async fn test_drop_registry_bucket() {
        let registry = BucketRegistry::new(
            std::sync::Arc::new(MemoryBackend::default()),
            BucketOptions::default(),
        )
        .unwrap();
        let bucket = registry.default_bucket().unwrap();
        let images = registry.bucket("images").unwrap();
        bucket
            .upload("a.txt", UploadSource::Bytes(b"aaa".to_vec()), UploadOptions::default())
            .await
            .unwrap();
        images
            .upload("b.png", UploadSource::Bytes(b"bbb".to_vec()), UploadOptions::default())
            .await
            .unwrap();

        bucket.drop_bucket().await.unwrap();

        let reopened = registry.default_bucket().unwrap();
        assert_eq!(reopened.find(&Filter::new(), &FindOptions::default()).await.unwrap().count(), 0);
        assert_eq!(images.find(&Filter::new(), &FindOptions::default()).await.unwrap().count(), 1);
    }

    /// Test text is recognised when the first chunk splits a character
    #[tokio::test]
    async fn test_text_sniff_across_chunk_boundary() {
        let (_backend, bucket) = create_test_bucket(5);
        let record = bucket
            .upload("accents.txt", UploadSource::Bytes("déjà vu".as_bytes().to_vec()), UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(record.content_type, "text/plain");
    }
}
