// Library exports for vderep
pub mod ani;
pub mod blast;
pub mod blast_exec;
pub mod checkv;
pub mod cluster;
pub mod derep;
pub mod error;
pub mod fasta;
pub mod table_io;
