//! # DBX xsort — 외부 정렬(External Sort)용 스필 배치 그룹
//!
//! 메모리에 올라 있는 정렬 배치와 디스크로 스필된 정렬 런(run)을 하나의
//! 반복 인터페이스([`BatchGroup`])로 통합합니다. 머지 단계는 데이터가
//! 메모리에 있는지 디스크에 있는지 신경 쓰지 않고 다음 행 인덱스만 요청합니다.
//!
//! ## 빠른 시작
//!
//! ```rust
//! use dbx_xsort::spill::SpillSet;
//! use dbx_xsort::record::VectorContainer;
//! use dbx_xsort::xsort::{BatchGroup, InputBatch, SpilledRun};
//! use arrow::array::Int64Array;
//! use arrow::datatypes::{DataType, Field, Schema};
//! use std::sync::Arc;
//!
//! # fn main() -> dbx_xsort::DbxResult<()> {
//! let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
//! let batch = VectorContainer::try_new(
//!     schema,
//!     vec![Arc::new(Int64Array::from(vec![3, 1, 2]))],
//! )?;
//!
//! // 메모리 런: 정렬 인덱스만 만들고 행은 이동하지 않음
//! let input = InputBatch::sorted(batch, &[(0, true)])?;
//!
//! // 디스크 런: 정렬된 배치를 스필 파일에 기록
//! let spill_set = Arc::new(SpillSet::temporary()?);
//! let mut run = SpilledRun::create(Arc::clone(&spill_set))?;
//! run.add_batch(input.materialize_sorted()?)?;
//!
//! // 읽기 (파괴적 단일 패스)
//! let mut rows = 0;
//! while let Some(_idx) = run.next_index()? {
//!     rows += 1;
//! }
//! assert_eq!(rows, 3);
//! run.close()?; // 스필 파일 삭제
//! # Ok(())
//! # }
//! ```
//!
//! ## 모듈 구조
//!
//! - [`record`] — 컬럼 컨테이너, 선택 벡터(SV2), 스키마 강제 변환
//! - [`spill`] — 스필 영역(SpillSet), 스트림, Arrow IPC 배치 코덱, 설정
//! - [`xsort`] — [`BatchGroup`], [`InputBatch`], [`SpilledRun`]

pub mod error;
pub mod record;
pub mod spill;
pub mod xsort;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use error::{DbxError, DbxResult};
pub use xsort::{BatchGroup, InputBatch, SpilledRun};
