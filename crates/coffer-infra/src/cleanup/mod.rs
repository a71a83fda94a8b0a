mod sweeper;

pub use sweeper::StagingSweeper;
