// ==========================================
// 并发台账写入测试
// ==========================================
// 职责: 多线程（各自独立连接）并发写同一单元格，不丢失更新
// ==========================================


#[cfg(test)]
mod concurrent_commit_test {
    use capacity_ledger_aps::config::LedgerPolicy;
    use capacity_ledger_aps::domain::{LedgerAction, ResetMode};
    use capacity_ledger_aps::engine::LedgerMutator;
    use capacity_ledger_aps::repository::{CapacityLedgerRepository, LedgerLogRepository};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    use crate::test_helpers::{assert_hours_eq, calendar, create_test_db, d};

    const THREADS: usize = 6;
    const COMMITS_PER_THREAD: usize = 15;

    fn open_mutator(db_path: &str) -> LedgerMutator {
        let repo = CapacityLedgerRepository::new(db_path).unwrap();
        let policy = LedgerPolicy {
            commit_max_retries: 5,
            ..LedgerPolicy::default()
        };
        LedgerMutator::new(Arc::new(repo), policy)
    }

    #[test]
    fn test_concurrent_commits_lose_no_update() {
        capacity_ledger_aps::logging::init_test();
        let (_temp, db_path) = create_test_db().unwrap();

        let seeder = CapacityLedgerRepository::new(&db_path).unwrap();
        seeder.seed_calendar(&calendar("Pack", &[(1, 8.0, 20)])).unwrap();

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let db_path = db_path.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let mutator = open_mutator(&db_path);
                    barrier.wait();
                    for _ in 0..COMMITS_PER_THREAD {
                        mutator.apply_delta("Pack", d(1), 0.5).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let record = seeder.find_by_process_and_date("Pack", d(1)).unwrap().unwrap();
        let expected = (THREADS * COMMITS_PER_THREAD) as f64 * 0.5;
        assert_hours_eq(record.occupied_hours, expected);
        assert_hours_eq(record.remaining_hours, 160.0 - expected);
        assert_eq!(record.revision, (THREADS * COMMITS_PER_THREAD) as i64);

        let conn = capacity_ledger_aps::db::open_sqlite_connection(&db_path).unwrap();
        let log_repo = LedgerLogRepository::new(Arc::new(Mutex::new(conn)));
        assert_eq!(
            log_repo.count_by_action(LedgerAction::Commit).unwrap(),
            (THREADS * COMMITS_PER_THREAD) as i64
        );
    }

    #[test]
    fn test_concurrent_commit_and_release_balance_out() {
        let (_temp, db_path) = create_test_db().unwrap();

        let seeder = CapacityLedgerRepository::new(&db_path).unwrap();
        seeder.seed_calendar(&calendar("Pack", &[(1, 8.0, 2)])).unwrap();

        // 先占满，再由一半线程释放、一半线程占用
        let base = open_mutator(&db_path);
        base.apply_delta("Pack", d(1), 10.0).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let db_path = db_path.clone();
                thread::spawn(move || {
                    let mutator = open_mutator(&db_path);
                    let delta = if i % 2 == 0 { 1.0 } else { -1.0 };
                    for _ in 0..5 {
                        mutator.apply_delta("Pack", d(1), delta).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let record = seeder.find_by_process_and_date("Pack", d(1)).unwrap().unwrap();
        assert_hours_eq(record.occupied_hours, 10.0);
        assert_hours_eq(record.remaining_hours, 6.0);
    }

    #[test]
    fn test_shared_mutator_across_threads_then_reset() {
        let (_temp, db_path) = create_test_db().unwrap();
        let seeder = CapacityLedgerRepository::new(&db_path).unwrap();
        seeder.seed_calendar(&calendar("Pack", &[(1, 8.0, 4)])).unwrap();

        let mutator = Arc::new(open_mutator(&db_path));
        let writer = {
            let mutator = mutator.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    mutator.apply_delta("Pack", d(1), 1.0).unwrap();
                }
            })
        };

        writer.join().unwrap();
        let summary = mutator.reset_all(ResetMode::Recalculate).unwrap();
        assert_eq!(summary.updated_count, 1);
        assert_hours_eq(summary.total_released_hours, 10.0);

        let record = seeder.find_by_process_and_date("Pack", d(1)).unwrap().unwrap();
        assert_hours_eq(record.occupied_hours, 0.0);
    }
}
