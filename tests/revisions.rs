#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gridstore::storage::memory::MemoryBackend;
    use gridstore::*;
    use tokio::time::{sleep, Duration};

    fn create_test_bucket() -> Bucket {
        let backend = MemoryBackend::default();
        Bucket::new(&backend, BucketOptions::default().with_chunk_size(4)).expect("can't create bucket")
    }

    async fn upload(bucket: &Bucket, name: &str, content: &str) -> FileRecord {
        bucket
            .upload(name, UploadSource::Bytes(content.as_bytes().to_vec()), UploadOptions::default())
            .await
            .expect("Failed to upload revision")
    }

    /// Test selectors count from the first upload and back from the latest
    #[tokio::test]
    async fn test_revision_selectors() {
        let bucket = create_test_bucket();
        let t0 = upload(&bucket, "rogue-one.jpg", "first").await;
        sleep(Duration::from_millis(5)).await;
        let t1 = upload(&bucket, "rogue-one.jpg", "second").await;
        sleep(Duration::from_millis(5)).await;
        let t2 = upload(&bucket, "rogue-one.jpg", "third").await;
        assert!(t0.upload_date < t1.upload_date && t1.upload_date < t2.upload_date);

        let latest = bucket
            .get_file_content_by_name("rogue-one.jpg", Revision::LATEST)
            .await
            .unwrap();
        assert_eq!(latest, b"third");

        let original = bucket
            .get_file_content_by_name("rogue-one.jpg", Revision::ORIGINAL)
            .await
            .unwrap();
        assert_eq!(original, b"first");

        let middle = bucket
            .get_file_content_by_name("rogue-one.jpg", Revision(-2))
            .await
            .unwrap();
        assert_eq!(middle, b"second");
        assert_eq!(
            bucket.open_download_stream_by_name("rogue-one.jpg", Revision(1)).await.unwrap().file().id,
            t1.id
        );

        let missing = bucket.open_download_stream_by_name("rogue-one.jpg", Revision(5)).await;
        assert!(matches!(missing, Err(GridError::NotFound(_))));
        let missing = bucket.open_download_stream_by_name("rogue-one.jpg", Revision(-4)).await;
        assert!(matches!(missing, Err(GridError::NotFound(_))));
    }

    /// Test unknown filenames fail with NotFound
    #[tokio::test]
    async fn test_unknown_filename() {
        let bucket = create_test_bucket();
        upload(&bucket, "a.txt", "a").await;
        let result = bucket.open_download_stream_by_name("b.txt", Revision::LATEST).await;
        assert!(result.err().is_some_and(|e| e.is_not_found()));
    }

    /// Test the latest revision is what get_file_by_name returns
    #[tokio::test]
    async fn test_get_file_by_name_is_latest() {
        let bucket = create_test_bucket();
        upload(&bucket, "doc.txt", "v1").await;
        let newest = upload(&bucket, "doc.txt", "v2").await;
        assert_eq!(bucket.get_file_by_name("doc.txt").await.unwrap().id, newest.id);
    }

    /// Test revisions are renumbered when one is deleted
    #[tokio::test]
    async fn test_delete_shifts_revisions() {
        let bucket = create_test_bucket();
        let first = upload(&bucket, "r.txt", "one").await;
        upload(&bucket, "r.txt", "two").await;

        bucket.delete(&first.id).await.unwrap();
        let original = bucket
            .get_file_content_by_name("r.txt", Revision::ORIGINAL)
            .await
            .unwrap();
        assert_eq!(original, b"two");
    }

    /// Test concurrent uploads of one filename become distinct revisions
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_uploads_same_filename() {
        let bucket = Arc::new(create_test_bucket());

        let a = {
            let bucket = Arc::clone(&bucket);
            tokio::spawn(async move { upload(&bucket, "shared.bin", "from caller a").await })
        };
        let b = {
            let bucket = Arc::clone(&bucket);
            tokio::spawn(async move { upload(&bucket, "shared.bin", "from caller b").await })
        };
        let a = a.await.expect("caller a panicked");
        let b = b.await.expect("caller b panicked");
        assert_ne!(a.id, b.id);

        let (first, second) = if (a.upload_date, a.id) <= (b.upload_date, b.id) {
            (a, b)
        } else {
            (b, a)
        };

        let rev0 = bucket
            .open_download_stream_by_name("shared.bin", Revision(0))
            .await
            .unwrap();
        assert_eq!(rev0.file().id, first.id);
        let rev1 = bucket
            .open_download_stream_by_name("shared.bin", Revision(1))
            .await
            .unwrap();
        assert_eq!(rev1.file().id, second.id);
        assert_eq!(
            rev1.read_to_end().await.unwrap(),
            bucket.get_file_content(&second.id).await.unwrap()
        );
    }
}
