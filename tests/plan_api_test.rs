// ==========================================
// 工序计划 API 集成测试
// ==========================================
// 覆盖: 倒排落库、顺延追加、修改工时、删除计划，台账与计划行保持一致
// ==========================================


#[cfg(test)]
mod plan_api_test {
    use capacity_ledger_aps::api::ApiError;
    use capacity_ledger_aps::app::AppState;

    use crate::test_helpers::{assert_hours_eq, calendar, create_test_state, d, pack_calendar};

    /// 每个单元格: occupied_hours == Σ 计划行工时
    fn assert_ledger_matches_rows(state: &AppState, process: &str, days: &[u32]) {
        for &day in days {
            let capacity = state
                .capacity_api
                .get_daily_capacity(process, d(day), None)
                .unwrap();
            let record = state
                .capacity_api
                .list_capacity(process, d(day), d(day))
                .unwrap()
                .remove(0);
            assert_hours_eq(record.occupied_hours, capacity.scheduled_hours);
            assert_hours_eq(record.remaining_hours, capacity.available_hours);
        }
    }

    #[test]
    fn test_schedule_plan_backward() {
        let (_temp, state) = create_test_state();
        state.capacity_api.seed_calendar(&pack_calendar()).unwrap();

        let plan = state
            .plan_api
            .schedule_plan("P1", "Pack", 7.0, d(5), None)
            .unwrap();
        assert_eq!(plan.start_date, d(2));
        assert_eq!(plan.end_date, d(5));
        assert_hours_eq(plan.total_hours(), 7.0);
        assert_eq!(state.plan_api.list_plan_rows("P1").unwrap().len(), 3);

        assert_ledger_matches_rows(&state, "Pack", &[1, 2, 3, 4, 5]);

        // 第二个计划只剩 01-02 的 1h
        assert!(matches!(
            state.plan_api.schedule_plan("P2", "Pack", 2.0, d(5), None),
            Err(ApiError::InsufficientCapacity { .. })
        ));
        assert!(state.plan_api.list_plan_rows("P2").unwrap().is_empty());
    }

    #[test]
    fn test_schedule_plan_by_quantity() {
        let (_temp, state) = create_test_state();
        state.capacity_api.seed_calendar(&pack_calendar()).unwrap();

        // 300 件 / 50 件每小时 = 6h
        let plan = state
            .plan_api
            .schedule_plan_by_quantity("P1", "Pack", 300.0, 50.0, d(5))
            .unwrap();
        assert_eq!(plan.start_date, d(4));
        assert_hours_eq(plan.total_hours(), 6.0);

        assert!(matches!(
            state
                .plan_api
                .schedule_plan_by_quantity("P2", "Pack", 300.0, 0.0, d(5)),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_add_plan_row_rolls_forward() {
        let (_temp, state) = create_test_state();
        state
            .capacity_api
            .seed_calendar(&calendar("Weld", &[(1, 4.0, 1), (2, 0.4, 1), (3, 4.0, 1), (4, 4.0, 1)]))
            .unwrap();

        let rows = state
            .plan_api
            .add_plan_row("P1", "Weld", d(1), 9.0, Some(d(4)))
            .unwrap();
        let layout: Vec<_> = rows
            .iter()
            .map(|row| (row.schedule_date, row.scheduled_work_hours))
            .collect();
        assert_eq!(layout, vec![(d(1), 4.0), (d(3), 4.0), (d(4), 1.0)]);
        assert_ledger_matches_rows(&state, "Weld", &[1, 2, 3, 4]);

        assert!(matches!(
            state.plan_api.add_plan_row("P2", "Weld", d(1), 5.0, Some(d(4))),
            Err(ApiError::NoFeasibleDate(_))
        ));
        assert!(state.plan_api.list_plan_rows("P2").unwrap().is_empty());
        assert_ledger_matches_rows(&state, "Weld", &[1, 2, 3, 4]);
    }

    #[test]
    fn test_edit_and_delete_keep_ledger_consistent() {
        let (_temp, state) = create_test_state();
        state.capacity_api.seed_calendar(&pack_calendar()).unwrap();

        let plan = state
            .plan_api
            .schedule_plan("P1", "Pack", 7.0, d(5), None)
            .unwrap();
        let first = &plan.rows[0];

        let outcome = state.plan_api.edit_row_hours(&first.row_id, 0.5).unwrap();
        assert_hours_eq(outcome.record.occupied_hours, 0.5);
        assert_ledger_matches_rows(&state, "Pack", &[1, 2, 3, 4, 5]);

        assert_eq!(state.plan_api.delete_plan("P1").unwrap(), 3);
        assert_ledger_matches_rows(&state, "Pack", &[1, 2, 3, 4, 5]);

        let restored = state.capacity_api.list_capacity("Pack", d(1), d(5)).unwrap();
        let remaining: Vec<f64> = restored.iter().map(|r| r.remaining_hours).collect();
        assert_eq!(remaining.len(), 5);
        for (actual, expected) in remaining.iter().zip([0.0, 2.0, 0.3, 5.0, 1.0]) {
            assert_hours_eq(*actual, expected);
        }
    }

    #[test]
    fn test_plan_input_validation() {
        let (_temp, state) = create_test_state();
        assert!(matches!(
            state.plan_api.schedule_plan("", "Pack", 1.0, d(5), None),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            state.plan_api.add_plan_row("P1", "Pack", d(1), -1.0, None),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_negative_threshold_rejected_by_both_apis() {
        let (_temp, state) = create_test_state();
        state.capacity_api.seed_calendar(&pack_calendar()).unwrap();

        assert!(matches!(
            state.capacity_api.get_end_date("Pack", d(5), Some(-1.0)),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            state.plan_api.schedule_plan("P1", "Pack", 1.0, d(5), Some(-1.0)),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            state.plan_api.schedule_plan("P1", "Pack", 1.0, d(5), Some(f64::NAN)),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(state.plan_api.list_plan_rows("P1").unwrap().is_empty());
    }
}
